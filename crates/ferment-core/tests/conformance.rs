//! Byte-level agreement with prost, the reference Rust protobuf stack.

use bytes::Bytes;
use ferment_core::{pb, Field, Message, Schema, SchemaRef};
use pretty_assertions::assert_eq;
use prost::Message as ProstMessage;
use prost_reflect::{DescriptorPool, DynamicMessage, Value as ReflectValue};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet, Timestamp,
};

#[derive(Clone, PartialEq, ::prost::Message)]
struct ProstChild {
    #[prost(int32, tag = "1")]
    id: i32,
    #[prost(string, tag = "2")]
    label: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct ProstRecord {
    #[prost(int32, tag = "1")]
    small: i32,
    #[prost(int64, tag = "2")]
    large: i64,
    #[prost(int32, repeated, tag = "3")]
    packed: Vec<i32>,
    #[prost(int64, repeated, packed = "false", tag = "4")]
    unpacked: Vec<i64>,
    #[prost(bool, tag = "5")]
    flag: bool,
    #[prost(bytes = "vec", tag = "6")]
    blob: Vec<u8>,
    #[prost(string, tag = "7")]
    text: String,
    #[prost(string, repeated, tag = "8")]
    tags: Vec<String>,
    #[prost(message, optional, tag = "9")]
    child: Option<ProstChild>,
    #[prost(message, repeated, tag = "10")]
    children: Vec<ProstChild>,
    #[prost(int32, optional, tag = "11")]
    maybe: Option<i32>,
}

struct ChildSchema {
    schema: SchemaRef,
    id: Field<i32>,
    label: Field<String>,
}

struct RecordSchema {
    schema: SchemaRef,
    small: Field<i32>,
    large: Field<i64>,
    packed: Field<Vec<i32>>,
    unpacked: Field<Vec<i64>>,
    flag: Field<bool>,
    blob: Field<Bytes>,
    text: Field<String>,
    tags: Field<Vec<String>>,
    child: Field<Message>,
    children: Field<Vec<Message>>,
    maybe: Field<Option<i32>>,
}

fn child_schema() -> ChildSchema {
    let mut builder = Schema::builder("Child");
    let id = builder.add("id", pb::int32(1));
    let label = builder.add("label", pb::string(2));
    ChildSchema {
        schema: builder.build().unwrap(),
        id,
        label,
    }
}

fn record_schema(child: &ChildSchema) -> RecordSchema {
    let mut builder = Schema::builder("Record");
    let small = builder.add("small", pb::int32(1));
    let large = builder.add("large", pb::int64(2));
    let packed = builder.add("packed", pb::repeated::int32(3));
    let unpacked = builder.add("unpacked", pb::repeated::int64_unpacked(4));
    let flag = builder.add("flag", pb::bool(5));
    let blob = builder.add("blob", pb::bytes(6));
    let text = builder.add("text", pb::string(7));
    let tags = builder.add("tags", pb::repeated::string(8));
    let child_field = builder.add("child", pb::message(&child.schema, 9));
    let children = builder.add("children", pb::repeated::message(&child.schema, 10));
    let maybe = builder.add("maybe", pb::optional(pb::int32(11)));
    RecordSchema {
        schema: builder.build().unwrap(),
        small,
        large,
        packed,
        unpacked,
        flag,
        blob,
        text,
        tags,
        child: child_field,
        children,
        maybe,
    }
}

fn prost_record() -> ProstRecord {
    ProstRecord {
        small: -42,
        large: 12_345_678_901_234,
        packed: vec![1, -2, 300],
        unpacked: vec![i64::MIN, 7],
        flag: true,
        blob: vec![0x00, 0xFF, 0x10],
        text: "Hello, World!".into(),
        tags: vec!["a".into(), "bc".into()],
        child: Some(ProstChild {
            id: 7,
            label: "Nested".into(),
        }),
        children: vec![
            ProstChild {
                id: 1,
                label: "First".into(),
            },
            ProstChild {
                id: 2,
                label: "Second".into(),
            },
        ],
        maybe: Some(0),
    }
}

fn ferment_record(child: &ChildSchema, record: &RecordSchema) -> Message {
    let make_child = |id: i32, label: &str| {
        Message::build(&child.schema, |m| {
            m.set(&child.id, id);
            m.set(&child.label, label.to_string());
        })
    };

    Message::build(&record.schema, |m| {
        m.set(&record.small, -42);
        m.set(&record.large, 12_345_678_901_234);
        m.set(&record.packed, vec![1, -2, 300]);
        m.set(&record.unpacked, vec![i64::MIN, 7]);
        m.set(&record.flag, true);
        m.set(&record.blob, Bytes::from_static(&[0x00, 0xFF, 0x10]));
        m.set(&record.text, "Hello, World!".to_string());
        m.set(&record.tags, vec!["a".to_string(), "bc".to_string()]);
        m.set(&record.child, make_child(7, "Nested"));
        m.set(
            &record.children,
            vec![make_child(1, "First"), make_child(2, "Second")],
        );
        m.set(&record.maybe, Some(0));
    })
}

#[test]
fn encoding_matches_prost_byte_for_byte() {
    let child = child_schema();
    let record = record_schema(&child);

    let ours = ferment_record(&child, &record).encode_to_vec();
    let theirs = prost_record().encode_to_vec();
    assert_eq!(ours, theirs);
}

#[test]
fn prost_reads_our_output() {
    let child = child_schema();
    let record = record_schema(&child);

    let ours = ferment_record(&child, &record).encode_to_vec();
    let decoded = ProstRecord::decode(ours.as_slice()).unwrap();
    assert_eq!(decoded, prost_record());
}

#[test]
fn we_read_prost_output() {
    let child = child_schema();
    let record = record_schema(&child);

    let bytes = prost_record().encode_to_vec();
    let decoded = Message::decode(&record.schema, &bytes).unwrap();

    assert_eq!(decoded.get(&record.small), -42);
    assert_eq!(decoded.get(&record.large), 12_345_678_901_234);
    assert_eq!(decoded.get(&record.packed), vec![1, -2, 300]);
    assert_eq!(decoded.get(&record.unpacked), vec![i64::MIN, 7]);
    assert!(decoded.get(&record.flag));
    assert_eq!(decoded.get(&record.blob).as_ref(), &[0x00, 0xFF, 0x10]);
    assert_eq!(decoded.get(&record.text), "Hello, World!");
    assert_eq!(decoded.get(&record.tags), vec!["a".to_string(), "bc".to_string()]);
    assert_eq!(decoded.get(&record.child).get(&child.label), "Nested");
    let children = decoded.get(&record.children);
    assert_eq!(children.len(), 2);
    assert_eq!(children[1].get(&child.id), 2);
    assert_eq!(decoded.get(&record.maybe), Some(0));
    assert_eq!(decoded, ferment_record(&child, &record));
}

#[test]
fn decodes_well_known_timestamp() {
    let mut builder = Schema::builder("Timestamp");
    let seconds = builder.add("seconds", pb::int64(1));
    let nanos = builder.add("nanos", pb::int32(2));
    let schema = builder.build().unwrap();

    let timestamp = Timestamp {
        seconds: 1_700_000_000,
        nanos: 123_456_789,
    };
    let decoded = Message::decode(&schema, &timestamp.encode_to_vec()).unwrap();
    assert_eq!(decoded.get(&seconds), 1_700_000_000);
    assert_eq!(decoded.get(&nanos), 123_456_789);

    let reencoded = decoded.encode_to_vec();
    assert_eq!(Timestamp::decode(reencoded.as_slice()).unwrap(), timestamp);
}

fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn reflect_pool() -> DescriptorPool {
    let child = DescriptorProto {
        name: Some("Child".into()),
        field: vec![
            field("id", 1, Label::Optional, Type::Int32),
            field("label", 2, Label::Optional, Type::String),
        ],
        ..Default::default()
    };

    let mut child_ref = field("child", 9, Label::Optional, Type::Message);
    child_ref.type_name = Some(".capture.Child".into());
    let mut children_ref = field("children", 10, Label::Repeated, Type::Message);
    children_ref.type_name = Some(".capture.Child".into());

    let record = DescriptorProto {
        name: Some("Record".into()),
        field: vec![
            field("small", 1, Label::Optional, Type::Int32),
            field("large", 2, Label::Optional, Type::Int64),
            field("packed", 3, Label::Repeated, Type::Int32),
            field("text", 7, Label::Optional, Type::String),
            child_ref,
            children_ref,
        ],
        ..Default::default()
    };

    let file = FileDescriptorProto {
        name: Some("capture.proto".into()),
        package: Some("capture".into()),
        syntax: Some("proto3".into()),
        message_type: vec![child, record],
        ..Default::default()
    };

    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] }).unwrap()
}

#[test]
fn reflection_reads_our_output() {
    let child = child_schema();
    let record = record_schema(&child);
    let bytes = ferment_record(&child, &record).encode_to_vec();

    let pool = reflect_pool();
    let descriptor = pool.get_message_by_name("capture.Record").unwrap();
    let dynamic = DynamicMessage::decode(descriptor, bytes.as_slice()).unwrap();

    assert_eq!(
        *dynamic.get_field_by_name("small").unwrap(),
        ReflectValue::I32(-42)
    );
    assert_eq!(
        *dynamic.get_field_by_name("large").unwrap(),
        ReflectValue::I64(12_345_678_901_234)
    );
    assert_eq!(
        *dynamic.get_field_by_name("packed").unwrap(),
        ReflectValue::List(vec![
            ReflectValue::I32(1),
            ReflectValue::I32(-2),
            ReflectValue::I32(300)
        ])
    );
    assert_eq!(
        *dynamic.get_field_by_name("text").unwrap(),
        ReflectValue::String("Hello, World!".into())
    );

    let nested = dynamic.get_field_by_name("child").unwrap();
    let nested = nested.as_message().unwrap();
    assert_eq!(
        *nested.get_field_by_name("label").unwrap(),
        ReflectValue::String("Nested".into())
    );

    let children = dynamic.get_field_by_name("children").unwrap();
    assert_eq!(children.as_list().unwrap().len(), 2);
}

#[test]
fn we_read_reflection_output() {
    let child = child_schema();
    let record = record_schema(&child);

    let pool = reflect_pool();
    let descriptor = pool.get_message_by_name("capture.Record").unwrap();
    let mut dynamic = DynamicMessage::new(descriptor);
    dynamic.set_field_by_name("small", ReflectValue::I32(i32::MIN));
    dynamic.set_field_by_name(
        "packed",
        ReflectValue::List(vec![ReflectValue::I32(5), ReflectValue::I32(6)]),
    );
    dynamic.set_field_by_name("text", ReflectValue::String("reflected".into()));

    let decoded = Message::decode(&record.schema, &dynamic.encode_to_vec()).unwrap();
    assert_eq!(decoded.get(&record.small), i32::MIN);
    assert_eq!(decoded.get(&record.packed), vec![5, 6]);
    assert_eq!(decoded.get(&record.text), "reflected");
    assert_eq!(decoded.get(&record.large), 0);
    assert!(decoded.unknown_fields().next().is_none());
}
