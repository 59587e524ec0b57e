//! Key rotation mid-life: fragments sealed under an older version must
//! stay decryptable after the active version moves on.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use fragvault_crypto::KeyManager;
use fragvault_engine::{FileCatalog, StorageEngine};
use fragvault_store::{LocalShardStore, OpendalObjectStore, SqliteMetadataStore};

struct Fixture {
    _tmp: tempfile::TempDir,
    catalog: FileCatalog,
    keys: Arc<KeyManager>,
    input_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();

    let op = opendal::Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    let remote = Arc::new(OpendalObjectStore::new(op, "fragments"));
    let shards = Arc::new(LocalShardStore::open(tmp.path().join("shards")).unwrap());
    let keys = Arc::new(KeyManager::open(tmp.path().join("keys.json")).unwrap());
    let metadata = Arc::new(SqliteMetadataStore::in_memory().unwrap());

    let engine = StorageEngine::new(keys.clone(), remote, shards, 5);
    let catalog = FileCatalog::new(engine, metadata, 524_288_000, tmp.path().join("out"));

    let input_dir = tmp.path().join("in");
    std::fs::create_dir_all(&input_dir).unwrap();

    Fixture {
        _tmp: tmp,
        catalog,
        keys,
        input_dir,
    }
}

#[tokio::test]
async fn rotation_keeps_old_uploads_readable() {
    let fx = fixture();
    let cancel = CancellationToken::new();

    let f1 = fx.input_dir.join("first.txt");
    std::fs::write(&f1, b"uploaded before rotation").unwrap();
    let desc1 = fx.catalog.upload(&f1, None, &cancel).await.unwrap();
    assert!(desc1.fragments.iter().all(|f| f.key_version == "v1"));

    fx.keys.rotate("v2", &[0x42u8; 32]).unwrap();

    let f2 = fx.input_dir.join("second.txt");
    std::fs::write(&f2, b"uploaded after rotation").unwrap();
    let desc2 = fx.catalog.upload(&f2, None, &cancel).await.unwrap();
    assert!(desc2.fragments.iter().all(|f| f.key_version == "v2"));

    // Old descriptor decrypts with v1, new with v2.
    let out1 = fx.catalog.download(&desc1.file_id, &cancel).await.unwrap();
    assert_eq!(std::fs::read(&out1).unwrap(), b"uploaded before rotation");

    let out2 = fx.catalog.download(&desc2.file_id, &cancel).await.unwrap();
    assert_eq!(std::fs::read(&out2).unwrap(), b"uploaded after rotation");
}

#[tokio::test]
async fn uploads_across_several_rotations() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let mut descriptors = Vec::new();

    for (i, (version, len)) in [("v2", 16usize), ("v3", 24), ("v4", 32)].iter().enumerate() {
        let path = fx.input_dir.join(format!("gen-{i}.bin"));
        let content = format!("generation {i} payload");
        std::fs::write(&path, &content).unwrap();

        let desc = fx.catalog.upload(&path, None, &cancel).await.unwrap();
        descriptors.push((desc, content));

        fx.keys.rotate(version, &vec![i as u8 + 1; *len]).unwrap();
    }

    // Every generation still reconstructs after all rotations.
    for (desc, content) in &descriptors {
        let out = fx.catalog.download(&desc.file_id, &cancel).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), content.as_bytes());
    }
}
