// crates/engine-wal/tests/corruption.rs
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use engine_wal::{replay, truncate_to, ReaderOptions, WalError, WalWriter, HEADER_SIZE};

fn collect(path: &Path, opts: ReaderOptions) -> Result<(Vec<Vec<u8>>, engine_wal::ReplayStats), WalError> {
    let mut seen = Vec::new();
    let stats = replay(path, opts, |payload, _| {
        seen.push(payload.to_vec());
        Ok::<(), WalError>(())
    })?;
    Ok((seen, stats))
}

fn write(path: &Path, records: &[&[u8]]) -> Vec<u64> {
    let mut w = WalWriter::open(path, 16).unwrap();
    let offs = records.iter().map(|r| w.append(r).unwrap()).collect();
    w.close().unwrap();
    offs
}

#[test]
fn flipped_payload_byte_fails_replay_with_checksum_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("BTC.wal");
    let offs = write(&path, &[b"first", b"second", b"third"]);

    // Flip one byte inside the second payload.
    let mut f = OpenOptions::new().write(true).read(true).open(&path).unwrap();
    f.seek(SeekFrom::Start(offs[0] + HEADER_SIZE as u64 + 2)).unwrap();
    f.write_all(&[b'X']).unwrap();
    f.sync_all().unwrap();

    // Even a tail-tolerant replay refuses corruption.
    let err = collect(&path, ReaderOptions::default().tolerate_tail()).unwrap_err();
    match err {
        WalError::ChecksumMismatch { offset } => assert_eq!(offset, offs[0]),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn missing_file_replays_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, stats) = collect(&dir.path().join("none.wal"), ReaderOptions::default()).unwrap();
    assert!(seen.is_empty());
    assert_eq!(stats, engine_wal::ReplayStats::default());
}

#[test]
fn torn_tail_repair_then_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ETH.wal");
    let offs = write(&path, &[b"a", b"bb", b"ccc"]);

    // Simulate a crash mid-append of the third record.
    let f = OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(offs[2] - 1).unwrap();
    drop(f);

    assert!(collect(&path, ReaderOptions::default())
        .unwrap_err()
        .is_truncation());

    let (seen, stats) = collect(&path, ReaderOptions::default().tolerate_tail()).unwrap();
    assert_eq!(seen, vec![b"a".to_vec(), b"bb".to_vec()]);
    assert!(stats.truncated_tail);
    assert_eq!(stats.last_good_offset, offs[1]);

    truncate_to(&path, stats.last_good_offset).unwrap();
    let mut w = WalWriter::open(&path, 0).unwrap();
    assert_eq!(w.offset(), offs[1]);
    w.append(b"dddd").unwrap();
    w.close().unwrap();

    let (seen, stats) = collect(&path, ReaderOptions::default()).unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], b"dddd".to_vec());
    assert!(!stats.truncated_tail);
}

#[test]
fn callback_error_stops_replay() {
    #[derive(Debug)]
    enum Stop {
        Wal,
        Here,
    }
    impl From<WalError> for Stop {
        fn from(_: WalError) -> Self {
            Stop::Wal
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.wal");
    write(&path, &[b"1", b"2", b"3"]);

    let mut calls = 0;
    let res = replay(&path, ReaderOptions::default(), |p, _| {
        calls += 1;
        if p == b"2" {
            Err(Stop::Here)
        } else {
            Ok(())
        }
    });
    assert!(matches!(res, Err(Stop::Here)));
    assert!(!matches!(res, Err(Stop::Wal)));
    assert_eq!(calls, 2);
}
