use rust_sqlite_wire::wire::{decode_scalar, LineWriter};
use rust_sqlite_wire::{decode, encode_scalar, DecodeError, ResultBuffer};

fn encoded(value: Option<&[u8]>) -> Vec<u8> {
    let mut buf = ResultBuffer::new();
    encode_scalar(&mut buf, value).unwrap();
    buf.as_bytes().to_vec()
}

#[test]
fn test_scalar_encoding() {
    assert_eq!(encoded(None), b"0.");
    assert_eq!(encoded(Some(b"")), b"1.!");
    assert_eq!(encoded(Some(b"1")), b"2.1!");
    assert_eq!(encoded(Some(b"hello")), b"6.hello!");

    let long = vec![b'z'; 1234];
    let bytes = encoded(Some(&long));
    assert!(bytes.starts_with(b"1235."));
    assert_eq!(bytes.len(), 5 + 1234 + 1);
    assert_eq!(bytes.last(), Some(&b'!'));
}

#[test]
fn test_scalar_round_trip_with_framing_bytes() {
    let values: Vec<Option<&[u8]>> = vec![
        None,
        Some(b""),
        Some(b"plain"),
        Some(b"a|b|c"),
        Some(b"line\nbreak"),
        Some(b"."),
        Some(b"!"),
        Some(b"0."),
        Some(b"12.x!|\n"),
        Some(b"\0binary\xff"),
    ];
    for value in values {
        let bytes = encoded(value);
        let (decoded, used) = decode_scalar(&bytes).unwrap();
        assert_eq!(decoded.as_deref(), value);
        assert_eq!(used, bytes.len());
    }
}

#[test]
fn test_line_writer_separators() {
    let mut buf = ResultBuffer::new();
    LineWriter::new(&mut buf).finish().unwrap();
    assert_eq!(buf.as_bytes(), b"\n");

    buf.reset();
    let mut line = LineWriter::new(&mut buf);
    line.field(Some(b"a")).unwrap();
    line.field(None).unwrap();
    line.field(Some(b"")).unwrap();
    line.finish().unwrap();
    assert_eq!(buf.as_bytes(), b"2.a!|0.|1.!\n");
}

#[test]
fn test_decode_table() {
    let set = decode(b"2.x!|2.y!\n2.1!|0.\n1.!|4.a|b!\n").unwrap();
    assert_eq!(set.column_names(), vec!["x", "y"]);
    assert_eq!(set.rows.len(), 2);
    assert_eq!(set.text(0, 0).as_deref(), Some("1"));
    assert_eq!(set.value(0, 1), None);
    assert_eq!(set.value(1, 0), Some(&b""[..]));
    assert_eq!(set.text(1, 1).as_deref(), Some("a|b"));
}

#[test]
fn test_decode_header_only() {
    let set = decode(b"\n").unwrap();
    assert!(set.columns.is_empty());
    assert!(set.rows.is_empty());
}

#[test]
fn test_decode_rejects_bad_framing() {
    assert_eq!(decode(b""), Err(DecodeError::Empty));
    assert_eq!(decode(b"2.x"), Err(DecodeError::Truncated { offset: 2, needed: 2, available: 1 }));
    assert_eq!(decode(b"2.xy\n"), Err(DecodeError::MissingSentinel(3)));
    assert_eq!(decode(b"2.x!;"), Err(DecodeError::MissingSeparator(4)));
    assert_eq!(decode(b"a.x!\n"), Err(DecodeError::InvalidLength(0)));
    assert_eq!(decode(b"2x!\n"), Err(DecodeError::MissingDot(0)));
    assert_eq!(
        decode(b"2.x!|2.y!\n2.1!\n"),
        Err(DecodeError::FieldCount { row: 0, expected: 2, found: 1 })
    );
}

#[test]
fn test_buffer_growth_keeps_written_bytes() {
    let mut buf = ResultBuffer::new();
    assert_eq!(buf.capacity(), 0);

    buf.push_byte(b'#').unwrap();
    assert!(buf.capacity() >= 1);

    let payload = vec![b'p'; 300];
    buf.push_bytes(&payload).unwrap();
    assert!(buf.capacity() >= 301);
    assert_eq!(buf.len(), 301);
    assert_eq!(buf.as_bytes()[0], b'#');
    assert!(buf.as_bytes()[1..].iter().all(|&b| b == b'p'));
}

#[test]
fn test_buffer_doubles_from_one() {
    let mut buf = ResultBuffer::new();
    buf.ensure(5).unwrap();
    // 1 -> 2 -> 4 -> 8
    assert!(buf.capacity() >= 8);
    assert!(buf.is_empty());
}

#[test]
fn test_buffer_reset_keeps_capacity() {
    let mut buf = ResultBuffer::with_capacity(64);
    buf.push_bytes(b"some bytes").unwrap();
    let cap = buf.capacity();
    buf.reset();
    assert_eq!(buf.len(), 0);
    assert_eq!(buf.capacity(), cap);
    assert_eq!(buf.as_bytes(), b"");
}

#[test]
fn test_buffer_decimal() {
    let mut buf = ResultBuffer::new();
    buf.push_decimal(0).unwrap();
    buf.push_byte(b' ').unwrap();
    buf.push_decimal(usize::MAX).unwrap();
    assert_eq!(buf.as_bytes(), format!("0 {}", usize::MAX).as_bytes());

    buf.reset();
    for value in [1, 9, 10, 99, 100, 1235] {
        buf.push_decimal(value).unwrap();
        buf.push_byte(b',').unwrap();
    }
    assert_eq!(buf.as_bytes(), b"1,9,10,99,100,1235,");
}
