use std::io::Write;

use pretty_assertions::assert_eq;
use soloterrent::metainfo::Metainfo;

fn write_sample_torrent(piece_hashes: &[[u8; 20]], piece_length: i64, total_len: i64) -> tempfile::NamedTempFile {
    let mut pieces = Vec::new();
    for h in piece_hashes {
        pieces.extend_from_slice(h);
    }

    // Bencode the metainfo dict by hand: the crate's raw structs are
    // private, so an integration test has to speak bencode directly, same
    // as a real torrent client reading someone else's file.
    let mut info = format!(
        "d6:lengthi{}e4:name10:sample.iso12:piece lengthi{}e6:pieces{}:",
        total_len,
        piece_length,
        pieces.len()
    )
    .into_bytes();
    info.extend_from_slice(&pieces);
    info.push(b'e');

    let mut buf = b"d8:announce29:http://tracker.example:6969/x4:info".to_vec();
    buf.extend_from_slice(&info);
    buf.push(b'e');

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&buf).unwrap();
    file
}

#[test]
fn opens_a_single_file_torrent_from_disk() {
    let hashes = [[1u8; 20], [2u8; 20], [3u8; 20]];
    let file = write_sample_torrent(&hashes, 16384, 16384 * 2 + 100);

    let metainfo = Metainfo::open(file.path()).unwrap();

    assert_eq!(metainfo.name, "sample.iso");
    assert_eq!(metainfo.piece_count(), 3);
    assert_eq!(metainfo.piece_len(0), 16384);
    assert_eq!(metainfo.piece_len(1), 16384);
    assert_eq!(metainfo.piece_len(2), 100);
    assert_eq!(metainfo.announce, "http://tracker.example:6969/x");
}

#[test]
fn rejects_a_nonexistent_file() {
    let err = Metainfo::open(std::path::Path::new("/nonexistent/path.torrent"));
    assert!(err.is_err());
}
