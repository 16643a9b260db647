//! Stream round trips over arbitrary chunk sizes and input segmentations.

use bytes::Bytes;
use futures::executor::block_on;
use futures::stream::{self, TryStreamExt};
use proptest::prelude::*;
use trustcore_protect::format::v4;
use trustcore_protect::{DecryptorStream, EncryptorStream, ProtectError, StreamConfig};
use trustcore_testkit::generators::{
    clear_data, encrypted_chunk_size, resource, segment, segmentation,
};

fn pieces(
    data: &[u8],
    sizes: &[usize],
) -> impl futures::Stream<Item = Result<Bytes, ProtectError>> + Unpin {
    stream::iter(segment(data, sizes).into_iter().map(Ok))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stream_roundtrip_any_chunk_size(
        chunk in encrypted_chunk_size(),
        res in resource(),
        data in clear_data(4096),
        writes in segmentation(700),
        reads in segmentation(900),
    ) {
        let config = StreamConfig { max_encrypted_chunk_size: chunk };
        let encryptor = EncryptorStream::new(pieces(&data, &writes), res.clone(), config).unwrap();
        prop_assert_eq!(encryptor.resource_id(), res.resource_id);

        let encrypted: Vec<Bytes> = block_on(encryptor.try_collect()).unwrap();
        let encrypted = encrypted.concat();
        prop_assert_eq!(
            encrypted.len() as u64,
            v4::get_encrypted_size(data.len() as u64, chunk).unwrap()
        );
        prop_assert_eq!(
            v4::get_clear_size(encrypted.len() as u64, chunk).unwrap(),
            data.len() as u64
        );

        let decryptor = DecryptorStream::new(pieces(&encrypted, &reads), res.key.clone());
        let clear: Vec<Bytes> = block_on(decryptor.try_collect()).unwrap();
        prop_assert_eq!(clear.concat(), data);
    }
}
