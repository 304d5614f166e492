//! Paged store properties that must hold for any buffer size

use strata::store::PagedStore;
use strata::StrataError;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn test_roundtrip_independent_of_buffer_size() {
    for buffer_size in [1, 2, 3, 7, 16, 64, 1000, 4096] {
        let store = PagedStore::new(buffer_size).unwrap();
        for len in [0, 1, 2, 3, 15, 16, 17, 255, 1024, 5000] {
            let data = pattern(len, buffer_size as u8);
            let name = format!("f{}", len);
            store.write_file(&name, &data).unwrap();
            assert_eq!(store.file_length(&name).unwrap(), len as u64);
            assert_eq!(
                store.read_file(&name).unwrap(),
                data,
                "buffer_size={buffer_size} len={len}"
            );
        }
    }
}

#[test]
fn test_chunked_writes_match_single_write() {
    let data = pattern(777, 5);
    for buffer_size in [3, 10, 128] {
        let store = PagedStore::new(buffer_size).unwrap();
        let mut out = store.create_output("chunked").unwrap();
        for chunk in data.chunks(13) {
            out.write_bytes(chunk).unwrap();
        }
        drop(out);
        assert_eq!(store.read_file("chunked").unwrap(), data);
    }
}

#[test]
fn test_overwrite_at_offset_zero_with_three_byte_buffers() {
    let store = PagedStore::new(3).unwrap();
    let mut out = store.create_output("f").unwrap();
    out.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    out.seek(0).unwrap();
    out.write_byte(9).unwrap();
    drop(out);

    let mut input = store.open_input("f").unwrap();
    assert_eq!(input.length(), 8);
    assert_eq!(input.read_bytes(8).unwrap(), vec![9, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_random_access_reads() {
    let store = PagedStore::new(5).unwrap();
    let data = pattern(100, 1);
    store.write_file("f", &data).unwrap();

    let mut input = store.open_input("f").unwrap();
    for pos in [99u64, 0, 42, 5, 4, 50] {
        input.seek(pos).unwrap();
        assert_eq!(input.read_byte().unwrap(), data[pos as usize]);
    }
    input.seek(100).unwrap();
    assert!(matches!(
        input.read_byte(),
        Err(StrataError::OutOfRange { .. })
    ));
    assert!(input.seek(101).is_err());
}

#[test]
fn test_typed_values_cross_buffer_boundaries() {
    let store = PagedStore::new(3).unwrap();
    let mut out = store.create_output("typed").unwrap();
    out.write_u32(0xDEAD_BEEF).unwrap();
    out.write_vint(300).unwrap();
    out.write_string("héllo").unwrap();
    out.write_u64(u64::MAX - 1).unwrap();
    drop(out);

    let mut input = store.open_input("typed").unwrap();
    assert_eq!(input.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(input.read_vint().unwrap(), 300);
    assert_eq!(input.read_string().unwrap(), "héllo");
    assert_eq!(input.read_u64().unwrap(), u64::MAX - 1);
    assert_eq!(input.remaining(), 0);
}

#[test]
fn test_deleted_buffers_are_reused() {
    let store = PagedStore::new(8).unwrap();
    store.write_file("a", &pattern(64, 0)).unwrap();
    let used = store.ram_bytes_used();
    store.delete_file("a").unwrap();
    assert_eq!(store.ram_bytes_used(), 0);

    store.write_file("b", &pattern(64, 9)).unwrap();
    assert_eq!(store.ram_bytes_used(), used);
    assert!(!store.file_exists("a"));
    assert!(matches!(store.open_input("a"), Err(StrataError::NotFound(_))));
}

#[test]
fn test_lock_contention_between_threads() {
    let store = PagedStore::new(8).unwrap();
    let mut lock = store.make_lock("write.lock");
    assert!(lock.obtain(0).unwrap());

    let other = store.clone();
    let waiter = std::thread::spawn(move || {
        let mut lock = other.make_lock("write.lock");
        lock.obtain(20).unwrap()
    });
    assert!(!waiter.join().unwrap());

    lock.release();
    let mut again = store.make_lock("write.lock");
    assert!(again.obtain(0).unwrap());
    assert!(matches!(again.obtain(0), Err(StrataError::LockHeld(_))));
}
