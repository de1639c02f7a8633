//! Tests for the schema codec
//!
//! These tests verify:
//! - Schema text parsing, errors, and canonical printing
//! - Nominal layout computation
//! - Offset bitmap encoding, hex form, and field-count recovery
//! - Value encoding per field type

use chrono::{DateTime, TimeZone, Utc};
use tabula::schema::{
    bitmap_from_hex, bitmap_to_hex, checked_ticks, decode_field_count, decode_offsets, decode_value,
    encode_offset_bitmap, encode_value, trim_trailing_zeros, Field, FieldType, Layout, Schema,
    Value,
};
use tabula::TabulaError;

// =============================================================================
// Helper Functions
// =============================================================================

fn field_count_of(schema_text: &str) -> usize {
    let schema = Schema::parse(schema_text).unwrap();
    let bitmap = schema.layout().bitmap();
    let hex = bitmap_to_hex(&bitmap);
    decode_field_count(&bitmap_from_hex(&hex).unwrap())
}

// =============================================================================
// Schema Text Tests
// =============================================================================

#[test]
fn test_parse_all_field_types() {
    let schema = Schema::parse("Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob").unwrap();

    assert_eq!(schema.len(), 5);
    let types: Vec<FieldType> = schema.fields().iter().map(|f| f.field_type).collect();
    assert_eq!(
        types,
        vec![
            FieldType::Integer,
            FieldType::String,
            FieldType::Boolean,
            FieldType::DateTime,
            FieldType::Blob
        ]
    );
    assert_eq!(schema.fields()[1].max_length, 16);
}

#[test]
fn test_schema_text_round_trip() {
    for text in [
        "Id:int",
        "Id:int,username:string:16",
        "Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob",
        "Note:string,Flag:bool",
    ] {
        assert_eq!(Schema::parse(text).unwrap().to_string(), text);
    }
}

#[test]
fn test_type_tokens_are_case_insensitive() {
    let schema = Schema::parse("Id:INT,Name:String:8").unwrap();
    assert_eq!(schema.fields()[0].field_type, FieldType::Integer);
    assert_eq!(schema.to_string(), "Id:int,Name:string:8");
}

#[test]
fn test_unknown_type_fails() {
    let err = Schema::parse("Id:int,Price:decimal").unwrap_err();
    assert!(matches!(err, TabulaError::UnknownFieldType(ref t) if t == "decimal"));
}

#[test]
fn test_malformed_schema_fails() {
    assert!(matches!(Schema::parse(""), Err(TabulaError::InvalidArgument(_))));
    assert!(matches!(Schema::parse("Id"), Err(TabulaError::InvalidArgument(_))));
    assert!(matches!(Schema::parse(":int"), Err(TabulaError::InvalidArgument(_))));
    assert!(matches!(Schema::parse("Name:string:abc"), Err(TabulaError::InvalidArgument(_))));
}

#[test]
fn test_field_lookup_is_case_insensitive() {
    let schema = Schema::parse("Id:int,UserName:string:16,Avatar:blob").unwrap();
    assert_eq!(schema.position("username"), Some(1));
    assert_eq!(schema.field("ID").map(|f| f.field_type), Some(FieldType::Integer));
    assert_eq!(schema.position("missing"), None);
    assert_eq!(schema.blob_positions(), vec![2]);
}

#[test]
fn test_builder_style_schema_prints_like_parsed() {
    let mut schema = Schema::default();
    schema.push(Field::new("Id", FieldType::Integer));
    schema.push(Field::new("Name", FieldType::String).with_max_length(12));
    assert_eq!(schema.to_string(), "Id:int,Name:string:12");
    assert_eq!(Schema::from_parts(&["Id:int", "Name:string:12"]).unwrap(), schema);
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_layout_offsets() {
    let schema = Schema::parse("Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob").unwrap();
    let layout = schema.layout();

    assert_eq!(layout.offsets, vec![0, 4, 36, 37, 45]);
    assert_eq!(layout.record_size, 45 + 100);
}

#[test]
fn test_unsized_string_uses_default_length() {
    let layout = Schema::parse("Name:string").unwrap().layout();
    assert_eq!(layout.record_size, 100);
}

// =============================================================================
// Offset Bitmap Tests
// =============================================================================

#[test]
fn test_bitmap_exact_bits() {
    // int, bool, datetime
    let bits = encode_offset_bitmap(&[0, 4, 5], 13);
    assert_eq!(bits.len(), 16);
    assert_eq!(bitmap_to_hex(&bits), "F5FE");
    assert_eq!(decode_field_count(&bits), 3);
    assert_eq!(decode_offsets(&bits), vec![0, 4, 5]);
}

#[test]
fn test_trailing_padding_is_trimmed() {
    let bits = encode_offset_bitmap(&[0, 4, 5], 13);
    assert_eq!(trim_trailing_zeros(&bits).len(), 15);
}

#[test]
fn test_field_count_derivation() {
    assert_eq!(field_count_of("Id:int"), 1);
    assert_eq!(field_count_of("Flag:bool"), 1);
    assert_eq!(field_count_of("Id:int,username:string:16"), 2);
    assert_eq!(field_count_of("A:bool,B:bool,C:bool,D:bool,E:bool,F:bool,G:bool,H:bool"), 8);
    assert_eq!(
        field_count_of("Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob"),
        5
    );
    assert_eq!(
        field_count_of("TableName:string:128,Schema:string:2048,BlobFields:string:1024,CreatedAt:datetime,UpdatedAt:datetime"),
        5
    );
}

#[test]
fn test_offsets_survive_hex() {
    let schema = Schema::parse("Id:int,Name:string:3,Flag:bool,At:datetime").unwrap();
    let Layout { offsets, record_size } = schema.layout();
    let hex = bitmap_to_hex(&encode_offset_bitmap(&offsets, record_size));
    assert_eq!(hex, hex.to_uppercase());
    assert_eq!(decode_offsets(&bitmap_from_hex(&hex).unwrap()), offsets);
}

#[test]
fn test_invalid_hex_is_metadata_corrupt() {
    assert!(matches!(bitmap_from_hex("XYZ"), Err(TabulaError::MetadataCorrupt(_))));
}

// =============================================================================
// Value Encoding Tests
// =============================================================================

#[test]
fn test_scalar_values_decode_to_themselves() {
    let at = Utc.with_ymd_and_hms(2024, 2, 29, 13, 45, 10).unwrap();
    let cases = [
        (Value::Integer(-42), FieldType::Integer),
        (Value::Boolean(true), FieldType::Boolean),
        (Value::DateTime(at), FieldType::DateTime),
        (Value::Text("héllo".to_string()), FieldType::String),
    ];
    for (value, field_type) in cases {
        let bytes = encode_value(Some(&value)).unwrap();
        assert_eq!(decode_value(&bytes, field_type), Some(value));
    }
}

#[test]
fn test_absent_value_is_empty_run() {
    assert!(encode_value(None).unwrap().is_empty());
    assert_eq!(decode_value(&[], FieldType::Integer), None);
    assert_eq!(decode_value(&[], FieldType::String), None);
}

#[test]
fn test_fixed_width_encodings() {
    assert_eq!(encode_value(Some(&Value::Integer(1))).unwrap(), vec![1, 0, 0, 0]);
    assert_eq!(encode_value(Some(&Value::Boolean(false))).unwrap(), vec![0]);

    let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
    let ticks: i64 = 621_355_968_000_000_000;
    assert_eq!(encode_value(Some(&Value::DateTime(epoch))).unwrap(), ticks.to_le_bytes().to_vec());
}

#[test]
fn test_datetime_tick_range_boundary() {
    // Last whole second whose tick count fits an i64
    let last = DateTime::from_timestamp(860_201_606_885, 0).unwrap();
    let bytes = encode_value(Some(&Value::DateTime(last))).unwrap();
    assert_eq!(decode_value(&bytes, FieldType::DateTime), Some(Value::DateTime(last)));

    let past = DateTime::from_timestamp(860_201_606_886, 0).unwrap();
    assert!(matches!(
        encode_value(Some(&Value::DateTime(past))),
        Err(TabulaError::InvalidArgument(_))
    ));

    let far = DateTime::from_timestamp(1_000_000_000_000, 0).unwrap();
    assert!(matches!(checked_ticks(&far), Err(TabulaError::InvalidArgument(_))));

    let before_epoch = DateTime::from_timestamp(-1_000_000_000_000, 0).unwrap();
    assert!(matches!(checked_ticks(&before_epoch), Err(TabulaError::InvalidArgument(_))));
}

#[test]
fn test_key_rendering() {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(Value::Integer(7).to_string(), "7");
    assert_eq!(Value::Boolean(false).to_string(), "false");
    assert_eq!(Value::DateTime(at).to_string(), "2024-01-02T03:04:05+00:00");
    assert_eq!(Value::Bytes(vec![0xab, 0x01]).to_string(), "AB01");
}
