use base64::Engine;

use crate::models::{EncodedImage, ImageBytes};

/// Standard alphabet, padded, no line wrapping.
pub fn encode(img: &ImageBytes) -> EncodedImage {
    EncodedImage {
        base64_payload: base64::engine::general_purpose::STANDARD.encode(&img.content),
        mime_type: img.mime_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn image(content: Vec<u8>) -> ImageBytes {
        ImageBytes { content: Bytes::from(content), mime_type: "image/jpeg".into() }
    }

    #[test]
    fn known_vector() {
        let encoded = encode(&image(b"foobar".to_vec()));
        assert_eq!(encoded.base64_payload, "Zm9vYmFy");
        assert_eq!(encoded.mime_type, "image/jpeg");
    }

    #[test]
    fn long_input_is_not_wrapped() {
        let encoded = encode(&image(vec![0xAB; 4096]));
        assert!(!encoded.base64_payload.contains('\n'));
        assert!(!encoded.base64_payload.contains('\r'));
    }

    proptest! {
        #[test]
        fn decodes_back_to_the_original_bytes(content in proptest::collection::vec(any::<u8>(), 1..2048)) {
            let encoded = encode(&image(content.clone()));
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.base64_payload.as_bytes())
                .unwrap();
            prop_assert_eq!(decoded, content);
        }
    }
}
