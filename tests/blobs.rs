use std::fs::OpenOptions;
use std::io::Cursor;

use bsdf::{Blob, Compression, Error, Options, Serializer, Value};

fn lazy_serializer() -> Serializer {
    Serializer::with_options(Options::new().lazy_blob(true))
}

#[test]
fn compression_shrinks_repetitive_blobs() {
    let value = Value::List(vec![
        Value::Int(1),
        Value::Int(2),
        Value::from(vec![0u8; 10000]),
    ]);

    let plain = Serializer::new().encode(&value).unwrap();
    let zlib = Serializer::with_options(Options::new().compression(Compression::Zlib))
        .encode(&value)
        .unwrap();
    let bz2 = Serializer::with_options(Options::new().compression(Compression::Bz2))
        .encode(&value)
        .unwrap();

    assert!(zlib.len() * 10 < plain.len(), "zlib at least 10x smaller");
    assert!(bz2.len() * 10 < plain.len(), "bz2 at least 10x smaller");

    for bytes in [plain, zlib, bz2] {
        let decoded = Serializer::new().decode(&bytes).unwrap();
        assert_eq!(decoded, value, "all compressions decode identically");
    }
}

#[test]
fn uncompressed_payloads_are_8_aligned() {
    // Shift the blob header around with strings of growing length; the
    // payload offset must stay a multiple of eight.
    for pad in 0..24usize {
        let value = Value::List(vec![
            Value::from("p".repeat(pad)),
            Value::from(b"payload".to_vec()),
        ]);
        let bytes = Serializer::new().encode(&value).unwrap();

        let mut file = Cursor::new(bytes);
        let decoded = lazy_serializer().load(&mut file).unwrap();
        let blob = decoded.as_list().unwrap()[1].as_blob().unwrap();
        let lazy = blob.as_lazy().unwrap();
        assert_eq!(
            lazy.start_offset() % 8,
            0,
            "payload offset {} for pad {}",
            lazy.start_offset(),
            pad
        );
    }
}

#[test]
fn lazy_blob_reads_without_materializing() {
    let value = Value::from(b"abcdefgh".to_vec());
    let bytes = Serializer::new().encode(&value).unwrap();

    let mut file = Cursor::new(bytes);
    let mut decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob_mut().unwrap().as_lazy_mut().unwrap();

    assert_eq!(lazy.data_size(), 8);
    assert_eq!(lazy.read(&mut file, 3).unwrap(), b"abc");
    assert_eq!(lazy.tell(), 3);
    lazy.seek(-2).unwrap();
    assert_eq!(lazy.read(&mut file, 2).unwrap(), b"gh");
    assert_eq!(lazy.get_bytes(&mut file).unwrap(), b"abcdefgh");
}

#[test]
fn lazy_blob_bounds_are_enforced() {
    let bytes = Serializer::new()
        .encode(&Value::from(b"abcd".to_vec()))
        .unwrap();
    let mut file = Cursor::new(bytes);
    let mut decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob_mut().unwrap().as_lazy_mut().unwrap();

    assert!(matches!(
        lazy.read(&mut file, 5),
        Err(Error::Bounds { .. })
    ));
    assert!(matches!(lazy.seek(5), Err(Error::Bounds { .. })));
    lazy.seek(4).unwrap();
    assert!(matches!(
        lazy.write(&mut file, b"x"),
        Err(Error::Bounds { .. })
    ));
}

#[test]
fn compressed_blobs_refuse_random_access() {
    let blob = Blob::new(vec![9u8; 100]).with_compression(Compression::Zlib);
    let bytes = Serializer::new().encode(&Value::Blob(blob)).unwrap();

    let mut file = Cursor::new(bytes);
    let mut decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob_mut().unwrap().as_lazy_mut().unwrap();

    assert!(matches!(
        lazy.read(&mut file, 1),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        lazy.write(&mut file, b"x"),
        Err(Error::Unsupported(_))
    ));
    // Full materialization still works.
    assert_eq!(lazy.get_bytes(&mut file).unwrap(), vec![9u8; 100]);
}

#[test]
fn lazy_blob_edit_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edit.bsdf");

    let blob = Blob::new(b"xxyyzz".to_vec()).with_extra_size(2);
    let mut file = std::fs::File::create(&path).unwrap();
    Serializer::new()
        .save(&mut file, &Value::Blob(blob))
        .unwrap();
    drop(file);

    // Reopen for update and overwrite the tail through the handle.
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let mut decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob_mut().unwrap().as_lazy_mut().unwrap();
    lazy.seek(4).unwrap();
    lazy.write(&mut file, b"aa").unwrap();
    lazy.close(&mut file).unwrap();
    drop(file);

    let mut file = std::fs::File::open(&path).unwrap();
    let reread = Serializer::new().load(&mut file).unwrap();
    assert_eq!(reread.as_bytes(), Some(&b"xxyyaa"[..]));
}

#[test]
fn lazy_blob_edit_refreshes_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checksum.bsdf");

    let blob = Blob::new(b"xxyyzz".to_vec())
        .with_extra_size(2)
        .with_checksum(true);
    let mut file = std::fs::File::create(&path).unwrap();
    Serializer::new()
        .save(&mut file, &Value::Blob(blob))
        .unwrap();
    drop(file);

    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let mut decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob_mut().unwrap().as_lazy_mut().unwrap();
    assert!(lazy.has_checksum());
    lazy.verify(&mut file).unwrap();

    lazy.seek(4).unwrap();
    lazy.write(&mut file, b"aa").unwrap();
    lazy.close(&mut file).unwrap();
    drop(file);

    // The digest on disk now matches the edited payload.
    let mut file = std::fs::File::open(&path).unwrap();
    let decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob().unwrap().as_lazy().unwrap();
    lazy.verify(&mut file).unwrap();
    assert_eq!(lazy.get_bytes(&mut file).unwrap(), b"xxyyaa");
}

#[test]
fn blob_with_headroom_roundtrips() {
    let blob = Blob::new(b"data".to_vec()).with_extra_size(100);
    let bytes = Serializer::new().encode(&Value::Blob(blob)).unwrap();
    let decoded = Serializer::new().decode(&bytes).unwrap();
    assert_eq!(decoded.as_bytes(), Some(&b"data"[..]));

    let mut file = Cursor::new(bytes);
    let decoded = lazy_serializer().load(&mut file).unwrap();
    let lazy = decoded.as_blob().unwrap().as_lazy().unwrap();
    assert_eq!(lazy.used_size(), 4);
    assert_eq!(lazy.allocated_size(), 104);
}

#[test]
fn lazy_blob_cannot_be_reencoded() {
    let bytes = Serializer::new()
        .encode(&Value::from(b"abc".to_vec()))
        .unwrap();
    let mut file = Cursor::new(bytes);
    let decoded = lazy_serializer().load(&mut file).unwrap();
    assert!(matches!(
        Serializer::new().encode(&decoded),
        Err(Error::Unsupported(_))
    ));
}
