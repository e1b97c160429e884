use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian};

use bsdf::{Error, ListStream, Options, Serializer, Value};

/// Offset of the stream header within a file whose root is the stream:
/// 6 header bytes, then the list tag.
const MARKER_AT: usize = 7;
const COUNT_AT: usize = 8;

fn scenario_values() -> Vec<Value> {
    let mut values = vec![Value::from("hi"), Value::Int(0)];
    values.extend((1..=9).map(|i| Value::Int(i * 101)));
    values.push(Value::List(vec![Value::Int(4), Value::Int(2)]));
    values
}

#[test]
fn append_and_close() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();

    let values = scenario_values();
    for v in &values {
        stream.append(&ser, &mut file, v).unwrap();
    }
    stream.close(&mut file).unwrap();

    let bytes = file.into_inner();
    assert_eq!(bytes[MARKER_AT], 254, "closed-stream marker");
    assert_eq!(
        LittleEndian::read_u64(&bytes[COUNT_AT..COUNT_AT + 8]),
        values.len() as u64,
        "count field equals the number of appends"
    );

    let decoded = ser.decode(&bytes).unwrap();
    assert_eq!(decoded, Value::List(values));
}

#[test]
fn open_stream_reads_to_eof() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    for i in 0..5 {
        stream.append(&ser, &mut file, &Value::Int(i)).unwrap();
    }
    // No close: the count stays zero and the stream reads as open.
    let bytes = file.into_inner();
    assert_eq!(bytes[MARKER_AT], 255);
    assert_eq!(LittleEndian::read_u64(&bytes[COUNT_AT..COUNT_AT + 8]), 0);

    let decoded = ser.decode(&bytes).unwrap();
    assert_eq!(
        decoded,
        Value::List((0..5).map(Value::Int).collect::<Vec<_>>())
    );
}

#[test]
fn append_after_close_reopens() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();

    stream.append(&ser, &mut file, &Value::from("hi")).unwrap();
    stream.close(&mut file).unwrap();
    for i in 0..3 {
        stream.append(&ser, &mut file, &Value::Int(i)).unwrap();
    }

    let bytes = file.clone().into_inner();
    assert_eq!(bytes[MARKER_AT], 255, "reopened header reads as open");
    let decoded = ser.decode(&bytes).unwrap();
    assert_eq!(
        decoded,
        Value::List(vec![
            Value::from("hi"),
            Value::Int(0),
            Value::Int(1),
            Value::Int(2),
        ])
    );

    // Closing again finalizes the accumulated total.
    stream.close(&mut file).unwrap();
    let bytes = file.into_inner();
    assert_eq!(bytes[MARKER_AT], 254);
    assert_eq!(LittleEndian::read_u64(&bytes[COUNT_AT..COUNT_AT + 8]), 4);
}

#[test]
fn close_is_idempotent() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    for i in 0..3 {
        stream.append(&ser, &mut file, &Value::Int(i)).unwrap();
    }

    stream.close(&mut file).unwrap();
    let once = file.clone().into_inner();
    stream.close(&mut file).unwrap();
    assert_eq!(file.into_inner(), once);
}

#[test]
fn closed_stream_yields_exact_count() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    stream.append(&ser, &mut file, &Value::Int(1)).unwrap();
    stream.append(&ser, &mut file, &Value::Int(2)).unwrap();
    stream.close(&mut file).unwrap();

    // Bytes past the finalized count are not part of the stream.
    let mut bytes = file.into_inner();
    bytes.extend_from_slice(b"vvv");
    let decoded = ser.decode(&bytes).unwrap();
    assert_eq!(decoded, Value::List(vec![Value::Int(1), Value::Int(2)]));
}

#[test]
fn hard_close_refuses_appends() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    stream.append(&ser, &mut file, &Value::Int(1)).unwrap();
    stream.close_hard(&mut file).unwrap();

    assert!(matches!(
        stream.append(&ser, &mut file, &Value::Int(2)),
        Err(Error::Structural(_))
    ));
    assert!(matches!(
        stream.close(&mut file),
        Err(Error::Structural(_))
    ));
}

#[test]
fn unbound_stream_refuses_everything() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    assert!(matches!(
        stream.append(&ser, &mut file, &Value::Int(1)),
        Err(Error::Structural(_))
    ));
    assert!(matches!(
        stream.close(&mut file),
        Err(Error::Structural(_))
    ));
}

#[test]
fn stream_must_be_last() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let root = Value::List(vec![Value::Stream(stream), Value::Int(1)]);
    let mut file = Cursor::new(Vec::new());
    assert!(matches!(
        ser.save(&mut file, &root),
        Err(Error::Structural(_))
    ));
}

#[test]
fn only_one_stream_per_file() {
    let ser = Serializer::new();
    let root = Value::List(vec![
        Value::Stream(ListStream::new()),
        Value::Stream(ListStream::new()),
    ]);
    let mut file = Cursor::new(Vec::new());
    assert!(matches!(
        ser.save(&mut file, &root),
        Err(Error::Structural(_))
    ));
}

#[test]
fn stream_handle_cannot_be_reused() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();

    let mut second = Cursor::new(Vec::new());
    assert!(matches!(
        ser.save(&mut second, &Value::Stream(stream)),
        Err(Error::Structural(_))
    ));
}

#[test]
fn streaming_read_yields_elements() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    for i in 0..4 {
        stream.append(&ser, &mut file, &Value::Int(i)).unwrap();
    }
    stream.close(&mut file).unwrap();

    let reader_ser = Serializer::with_options(Options::new().load_streaming(true));
    let mut file = Cursor::new(file.into_inner());
    let decoded = reader_ser.load(&mut file).unwrap();
    let reader = decoded.as_stream().expect("should surface a stream handle");

    let mut seen = Vec::new();
    while let Some(v) = reader.next(&reader_ser, &mut file).unwrap() {
        seen.push(v);
    }
    assert_eq!(seen, (0..4).map(Value::Int).collect::<Vec<_>>());

    // Exhausted streams keep yielding None.
    assert_eq!(reader.next(&reader_ser, &mut file).unwrap(), None);
}

#[test]
fn streaming_read_of_open_stream() {
    let ser = Serializer::new();
    let stream = ListStream::new();
    let mut file = Cursor::new(Vec::new());
    ser.save(&mut file, &Value::Stream(stream.clone())).unwrap();
    stream.append(&ser, &mut file, &Value::from("a")).unwrap();
    stream.append(&ser, &mut file, &Value::from("b")).unwrap();

    let reader_ser = Serializer::with_options(Options::new().load_streaming(true));
    let mut file = Cursor::new(file.into_inner());
    let decoded = reader_ser.load(&mut file).unwrap();
    let reader = decoded.as_stream().unwrap();

    assert_eq!(
        reader.next(&reader_ser, &mut file).unwrap(),
        Some(Value::from("a"))
    );
    assert_eq!(
        reader.next(&reader_ser, &mut file).unwrap(),
        Some(Value::from("b"))
    );
    assert_eq!(reader.next(&reader_ser, &mut file).unwrap(), None);
}
