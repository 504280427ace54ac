use fidx::{Error, FixedBytes, Handle, OpenOptions};
use rand::prelude::*;
use tempfile::TempDir;

type K20 = FixedBytes<20>;
type V20 = FixedBytes<20>;

fn filled(byte: u8) -> FixedBytes<20> {
    FixedBytes([byte; 20])
}

fn random_20(rng: &mut impl Rng) -> FixedBytes<20> {
    let mut buf = [0u8; 20];
    rng.fill(&mut buf);
    FixedBytes(buf)
}

#[test]
fn roundtrip_live() {
    let dir = TempDir::new().unwrap();
    let opts = OpenOptions::new(4).fresh(true);
    let handle = Handle::<K20, V20>::open(dir.path(), opts).unwrap();

    let key = filled(b'a');
    let value = filled(b'b');
    handle.replace(key.clone(), value.clone()).unwrap();

    assert_eq!(handle.find(&key).unwrap(), value);
}

#[test]
fn restart_preserves_value() {
    let dir = TempDir::new().unwrap();
    let key = filled(b'a');
    let value = filled(b'b');

    {
        let handle = Handle::<K20, V20>::open(dir.path(), OpenOptions::new(4).fresh(true)).unwrap();
        handle.replace(key.clone(), value.clone()).unwrap();
        handle.flush().unwrap();
    }

    let reopened = Handle::<K20, V20>::open(dir.path(), OpenOptions::new(4)).unwrap();
    assert_eq!(reopened.find(&key).unwrap(), value);
}

#[test]
fn size_guard_rejects_mismatched_key_length() {
    let dir = TempDir::new().unwrap();

    // FixedBytes<N>'s own ENCODED_LEN always agrees with what `encode`
    // produces, so the guard can only be exercised through a Key impl
    // whose declared length disagrees with its actual encoding — exactly
    // the "key of length 2 claiming length 20" case this guards against.
    struct BuggyKey;
    impl Clone for BuggyKey {
        fn clone(&self) -> Self {
            BuggyKey
        }
    }
    impl std::fmt::Debug for BuggyKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "BuggyKey")
        }
    }
    impl PartialEq for BuggyKey {
        fn eq(&self, _other: &Self) -> bool {
            true
        }
    }
    impl Eq for BuggyKey {}
    impl std::hash::Hash for BuggyKey {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            0u8.hash(state)
        }
    }
    impl fidx::Key for BuggyKey {
        const ENCODED_LEN: usize = 20;
        fn hash(&self) -> u64 {
            0
        }
        fn encode(&self) -> Vec<u8> {
            vec![0u8; 2]
        }
        fn decode(_bytes: &[u8]) -> fidx::Result<Self> {
            Ok(BuggyKey)
        }
    }

    let buggy = Handle::<BuggyKey, V20>::open(dir.path(), OpenOptions::new(1024)).unwrap();
    let err = buggy.replace(BuggyKey, filled(b'v')).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidKeySize {
            expected: 20,
            actual: 2
        }
    ));
}

#[test]
fn read_only_handle_observes_writer_after_sync() {
    let dir = TempDir::new().unwrap();
    let writer =
        Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1024).fresh(true)).unwrap();
    let reader =
        Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1024).readonly(true)).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let entries: Vec<(K20, V20)> = (0..103)
        .map(|_| (random_20(&mut rng), random_20(&mut rng)))
        .collect();
    for (k, v) in &entries {
        writer.replace(k.clone(), v.clone()).unwrap();
    }
    writer.flush().unwrap();

    for (k, v) in &entries {
        assert_eq!(reader.find(k).unwrap(), *v);
    }
}

#[test]
fn force_merge_interleave_is_visible_to_readers() {
    let dir = TempDir::new().unwrap();
    let writer =
        Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1_000_000).fresh(true)).unwrap();

    let readers: Vec<_> = (0..3)
        .map(|_| Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1024).readonly(true)).unwrap())
        .collect();

    let mut rng = StdRng::seed_from_u64(7);
    let mut last_gen = 0u64;
    for i in 0..10u8 {
        let k1 = random_20(&mut rng);
        let v1 = random_20(&mut rng);
        let k2 = random_20(&mut rng);
        let v2 = random_20(&mut rng);

        writer.replace(k1.clone(), v1.clone()).unwrap();
        writer.force_merge().unwrap();
        writer.replace(k2.clone(), v2.clone()).unwrap();
        writer.force_merge().unwrap();
        writer.flush().unwrap();

        let gen = writer.generation().unwrap();
        assert!(gen > last_gen, "generation must strictly increase on iteration {i}");
        last_gen = gen;

        for reader in &readers {
            assert_eq!(reader.find(&k1).unwrap(), v1);
            assert_eq!(reader.find(&k2).unwrap(), v2);
        }
    }
}

#[test]
fn open_twice_close_one_keeps_the_other_serving() {
    let dir = TempDir::new().unwrap();
    let opts = OpenOptions::new(1024).fresh(true);

    let a = Handle::<K20, V20>::open(dir.path(), opts.clone()).unwrap();
    let key = filled(b'x');
    let value = filled(b'y');
    a.replace(key.clone(), value.clone()).unwrap();

    let b = Handle::<K20, V20>::open(dir.path(), opts).unwrap();

    a.close();
    assert_eq!(b.find(&key).unwrap(), value);

    assert!(matches!(a.find(&key), Err(Error::Closed)));

    b.close();
}

#[test]
fn idempotent_close_has_no_additional_effect() {
    let dir = TempDir::new().unwrap();
    let handle = Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1024).fresh(true)).unwrap();
    handle.close();
    handle.close();
    assert!(matches!(handle.find(&filled(b'z')), Err(Error::Closed)));
}

#[test]
fn clear_resets_generation_and_empties_store() {
    let dir = TempDir::new().unwrap();
    let handle = Handle::<K20, V20>::open(dir.path(), OpenOptions::new(1).fresh(true)).unwrap();

    handle.replace(filled(b'a'), filled(b'b')).unwrap();
    handle.force_merge().unwrap();
    assert!(handle.generation().unwrap() > 0);

    handle.clear().unwrap();
    assert_eq!(handle.generation().unwrap(), 0);
    assert!(!handle.mem(&filled(b'a')).unwrap());
}
