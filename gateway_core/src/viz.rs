use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::codec::{self, DecodeError};
use crate::primitives::{Landmark, LandmarkSets};

/// 21-point hand skeleton edges, index-compatible with the oracle's
/// landmark ordering.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

const HAND_POINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const HAND_EDGE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const POSE_POINT_COLOR: Rgb<u8> = Rgb([66, 133, 244]);
const MIN_POSE_VISIBILITY: f32 = 0.5;

fn to_pixel(lm: &Landmark, w: f32, h: f32) -> (f32, f32) {
    (
        lm.x.clamp(0.0, 1.0) * (w - 1.0).max(0.0),
        lm.y.clamp(0.0, 1.0) * (h - 1.0).max(0.0),
    )
}

/// Draws the detected landmarks onto `image`. Landmarks are normalized, so
/// drawing happens on the original-resolution frame regardless of the size
/// detection actually ran at.
pub fn draw_landmarks(image: &mut RgbImage, sets: &LandmarkSets) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    for hand in &sets.hands {
        for (a, b) in HAND_CONNECTIONS {
            if let (Some(from), Some(to)) = (hand.get(a), hand.get(b)) {
                draw_line_segment_mut(
                    image,
                    to_pixel(from, w, h),
                    to_pixel(to, w, h),
                    HAND_EDGE_COLOR,
                );
            }
        }
        for lm in hand {
            let (x, y) = to_pixel(lm, w, h);
            draw_filled_circle_mut(image, (x as i32, y as i32), 3, HAND_POINT_COLOR);
        }
    }
    if let Some(pose) = &sets.pose {
        for lm in pose {
            if lm.visibility.unwrap_or(1.0) < MIN_POSE_VISIBILITY {
                continue;
            }
            let (x, y) = to_pixel(lm, w, h);
            draw_filled_circle_mut(image, (x as i32, y as i32), 4, POSE_POINT_COLOR);
        }
    }
}

/// Annotated copy of the frame as a base64 JPEG for the `visualization`
/// field of detection messages.
pub fn render_annotated_jpeg(
    image: &RgbImage,
    sets: &LandmarkSets,
    jpeg_quality: u8,
) -> Result<String, DecodeError> {
    let mut canvas = image.clone();
    draw_landmarks(&mut canvas, sets);
    codec::encode_jpeg_base64(&canvas, jpeg_quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::HAND_LANDMARK_COUNT;
    use crate::primitives::Handedness;

    fn fake_hand() -> LandmarkSets {
        let landmarks = (0..HAND_LANDMARK_COUNT)
            .map(|i| {
                let t = i as f32 / HAND_LANDMARK_COUNT as f32;
                Landmark::new(0.2 + 0.6 * t, 0.3 + 0.4 * t, 0.0)
            })
            .collect();
        LandmarkSets {
            hands: vec![landmarks],
            handedness: vec![Handedness::new("Left", 0.9)],
            pose: Some(vec![
                Landmark::with_visibility(0.5, 0.1, 0.0, 0.9),
                Landmark::with_visibility(0.5, 0.9, 0.0, 0.1),
            ]),
        }
    }

    #[test]
    fn test_drawing_touches_the_canvas() {
        let mut image = RgbImage::from_pixel(160, 120, Rgb([0, 0, 0]));
        draw_landmarks(&mut image, &fake_hand());
        let touched = image.pixels().filter(|p| p.0 != [0, 0, 0]).count();
        assert!(touched > HAND_LANDMARK_COUNT, "expected drawn pixels");
    }

    #[test]
    fn test_low_visibility_pose_points_are_skipped() {
        let mut sets = fake_hand();
        sets.hands.clear();
        sets.handedness.clear();
        sets.pose = Some(vec![Landmark::with_visibility(0.5, 0.9, 0.0, 0.1)]);
        let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        draw_landmarks(&mut image, &sets);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_render_annotated_jpeg_roundtrip() -> anyhow::Result<()> {
        let image = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
        let encoded = render_annotated_jpeg(&image, &fake_hand(), 80)?;
        let decoded = codec::decode_image(&codec::decode_payload(&encoded)?)?;
        assert_eq!(decoded.dimensions(), (64, 48));
        Ok(())
    }

    #[test]
    fn test_out_of_range_landmarks_are_clamped() {
        let mut image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let sets = LandmarkSets {
            hands: vec![vec![Landmark::new(4.2, -3.0, 0.0); HAND_LANDMARK_COUNT]],
            handedness: vec![Handedness::new("Left", 0.9)],
            pose: None,
        };
        // Must not panic; clamped coordinates land on the border.
        draw_landmarks(&mut image, &sets);
    }
}
