use image::{DynamicImage, GenericImageView};
use img_migrate::compressor::{compress, downscale_to_fit, CompressionTarget, Preset};
use img_migrate::constants::{AGGRESSIVE_THRESHOLD_BYTES, CONSERVATIVE_THRESHOLD_BYTES};
use img_migrate::storage::{compressed_key, is_compressed, validate_key};
use img_migrate::utils::sanitize_key_segment;
use proptest::prelude::*;

proptest! {
    #[test]
    fn preset_follows_size_thresholds(len in 0u64..16 * 1024 * 1024) {
        let preset = Preset::for_input_size(len);
        if len > AGGRESSIVE_THRESHOLD_BYTES {
            prop_assert_eq!(preset, Preset::Aggressive);
        } else if len < CONSERVATIVE_THRESHOLD_BYTES {
            prop_assert_eq!(preset, Preset::Conservative);
        } else {
            prop_assert_eq!(preset, Preset::Default);
        }
    }

    #[test]
    fn target_quality_must_be_a_fraction(quality in -2.0f32..3.0f32) {
        let result = CompressionTarget::new(1024, 1024, quality, 4, None);
        prop_assert_eq!(result.is_ok(), (0.0..=1.0).contains(&quality));
    }

    #[test]
    fn compress_never_grows_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 1..2048)) {
        let result = compress(&bytes, &Preset::Default.target()).unwrap();
        prop_assert!(result.size_bytes <= result.original_size_bytes);
        prop_assert_eq!(result.size_bytes, result.bytes.len() as u64);
        prop_assert_eq!(
            result.savings_bytes(),
            result.original_size_bytes - result.size_bytes
        );
    }

    #[test]
    fn downscale_never_exceeds_bound(
        width in 1u32..=600u32,
        height in 1u32..=600u32,
        max_dimension in 16u32..=400u32
    ) {
        let mut img = DynamicImage::new_rgb8(width, height);
        downscale_to_fit(&mut img, max_dimension);

        let (w, h) = img.dimensions();
        prop_assert!(w <= width && h <= height);
        if width.max(height) <= max_dimension {
            prop_assert_eq!((w, h), (width, height));
        } else {
            prop_assert!(w.max(h) <= max_dimension);
        }
    }

    #[test]
    fn compressed_keys_are_marked_and_valid(
        dir in "[a-z]{1,8}(/[a-z0-9]{1,8}){0,2}",
        job_id in ".{0,24}",
        ext in "(jpg|png|webp)"
    ) {
        let original = format!("{}/photo.bmp", dir);
        let key = compressed_key(Some(&original), &job_id, &ext);

        prop_assert!(is_compressed(&key));
        let expected_prefix = format!("{}/compressed_", dir);
        let expected_suffix = format!(".{}", ext);
        prop_assert!(key.starts_with(&expected_prefix));
        prop_assert!(key.ends_with(&expected_suffix));
        prop_assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn sanitized_segments_are_key_safe(raw in ".{0,40}") {
        let segment = sanitize_key_segment(&raw);
        prop_assert!(!segment.is_empty());
        prop_assert!(segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn traversal_keys_are_rejected(prefix in "[a-z]{0,6}", suffix in "[a-z]{0,6}") {
        let key = format!("{}/../{}", prefix, suffix);
        prop_assert!(validate_key(&key).is_err());
    }
}
