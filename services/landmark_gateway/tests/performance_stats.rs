mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serial_test::serial;

use common::*;
use gateway_core::dispatcher::DetectionDispatcher;
use gateway_core::protocol::{ClientMessage, ServerMessage};

/// The session must push `performance_stats` on its own period, reporting
/// the rolling averages and the resolutions of the last processed frame.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn periodic_performance_stats_test() -> Result<()> {
    let mut conf = test_configuration();
    conf.stats.push_period = Duration::from_millis(150);
    let dispatcher = Arc::new(DetectionDispatcher::new(
        Some(Arc::new(SlowOracle {
            delay: Duration::from_millis(10),
        })),
        2,
        Duration::from_millis(500),
    ));
    let mut harness = start_session(&conf, dispatcher);
    let session = harness.session.clone();

    let payload = frame_payload();
    for i in 1..=10i64 {
        session.handle_message(ClientMessage::HandFrame {
            data: payload.clone(),
            timestamp: i,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let received = drain_messages_until(&mut harness.outbound, deadline, |r| {
        count_detections(r) == 10
            && r.iter()
                .any(|m| matches!(m, ServerMessage::PerformanceStats { .. }))
    })
    .await;

    let stats = received
        .iter()
        .find(|m| matches!(m, ServerMessage::PerformanceStats { .. }));
    match stats {
        Some(ServerMessage::PerformanceStats {
            avg_processing_ms,
            quality_score,
            resolution_scale,
            processing_size,
            original_size,
            ..
        }) => {
            assert!(*avg_processing_ms > 0.0);
            assert!((0.0..=1.0).contains(quality_score));
            // 160 px wide frames sit below every scaling threshold.
            assert_eq!(*resolution_scale, 1.0);
            assert_eq!(*original_size, [160, 120]);
            assert_eq!(*processing_size, [160, 120]);
        }
        other => panic!("expected performance stats, got {:?}", other),
    }

    harness.stop().await;
    Ok(())
}
