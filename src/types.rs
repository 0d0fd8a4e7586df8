//! The descriptor output model: a hand-written mirror of
//! `google/protobuf/descriptor.proto`.
//!
//! These types encode byte-identically to the canonical descriptor schema.
//! The one departure from a generated mirror is [`Options<T>`]: every
//! options field retains its raw encoded form alongside the typed value, so
//! interpreted custom options (extensions the typed struct cannot
//! represent) survive re-encoding.

use std::fmt;

use prost::{
    bytes::{Buf, BufMut},
    encoding::{decode_key, decode_varint, encode_key, encode_varint, DecodeContext, WireType},
    DecodeError, Message,
};

pub use prost_types::{
    descriptor_proto::ReservedRange, enum_descriptor_proto::EnumReservedRange,
    field_descriptor_proto, source_code_info, uninterpreted_option, EnumOptions,
    EnumValueOptions, ExtensionRangeOptions, FieldOptions, FileOptions, MessageOptions,
    MethodOptions, OneofOptions, ServiceOptions, SourceCodeInfo, UninterpretedOption,
};

#[derive(Clone, PartialEq, Message)]
pub struct FileDescriptorSet {
    #[prost(message, repeated, tag = "1")]
    pub file: Vec<FileDescriptorProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FileDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub package: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub dependency: Vec<String>,
    #[prost(int32, repeated, packed = "false", tag = "10")]
    pub public_dependency: Vec<i32>,
    #[prost(int32, repeated, packed = "false", tag = "11")]
    pub weak_dependency: Vec<i32>,
    #[prost(message, repeated, tag = "4")]
    pub message_type: Vec<DescriptorProto>,
    #[prost(message, repeated, tag = "5")]
    pub enum_type: Vec<EnumDescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    pub service: Vec<ServiceDescriptorProto>,
    #[prost(message, repeated, tag = "7")]
    pub extension: Vec<FieldDescriptorProto>,
    #[prost(message, optional, tag = "8")]
    pub options: Option<Options<FileOptions>>,
    #[prost(message, optional, tag = "9")]
    pub source_code_info: Option<SourceCodeInfo>,
    #[prost(string, optional, tag = "12")]
    pub syntax: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub field: Vec<FieldDescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    pub extension: Vec<FieldDescriptorProto>,
    #[prost(message, repeated, tag = "3")]
    pub nested_type: Vec<DescriptorProto>,
    #[prost(message, repeated, tag = "4")]
    pub enum_type: Vec<EnumDescriptorProto>,
    #[prost(message, repeated, tag = "5")]
    pub extension_range: Vec<ExtensionRange>,
    #[prost(message, repeated, tag = "8")]
    pub oneof_decl: Vec<OneofDescriptorProto>,
    #[prost(message, optional, tag = "7")]
    pub options: Option<Options<MessageOptions>>,
    #[prost(message, repeated, tag = "9")]
    pub reserved_range: Vec<ReservedRange>,
    #[prost(string, repeated, tag = "10")]
    pub reserved_name: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExtensionRange {
    #[prost(int32, optional, tag = "1")]
    pub start: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub end: Option<i32>,
    #[prost(message, optional, tag = "3")]
    pub options: Option<Options<ExtensionRangeOptions>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub number: Option<i32>,
    #[prost(enumeration = "field_descriptor_proto::Label", optional, tag = "4")]
    pub label: Option<i32>,
    #[prost(enumeration = "field_descriptor_proto::Type", optional, tag = "5")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub type_name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub extendee: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub default_value: Option<String>,
    #[prost(int32, optional, tag = "9")]
    pub oneof_index: Option<i32>,
    #[prost(string, optional, tag = "10")]
    pub json_name: Option<String>,
    #[prost(message, optional, tag = "8")]
    pub options: Option<Options<FieldOptions>>,
    #[prost(bool, optional, tag = "17")]
    pub proto3_optional: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OneofDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub options: Option<Options<OneofOptions>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EnumDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub value: Vec<EnumValueDescriptorProto>,
    #[prost(message, optional, tag = "3")]
    pub options: Option<Options<EnumOptions>>,
    #[prost(message, repeated, tag = "4")]
    pub reserved_range: Vec<EnumReservedRange>,
    #[prost(string, repeated, tag = "5")]
    pub reserved_name: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EnumValueDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub number: Option<i32>,
    #[prost(message, optional, tag = "3")]
    pub options: Option<Options<EnumValueOptions>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServiceDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub method: Vec<MethodDescriptorProto>,
    #[prost(message, optional, tag = "3")]
    pub options: Option<Options<ServiceOptions>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MethodDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub input_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub output_type: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub options: Option<Options<MethodOptions>>,
    #[prost(bool, optional, tag = "5", default = "false")]
    pub client_streaming: Option<bool>,
    #[prost(bool, optional, tag = "6", default = "false")]
    pub server_streaming: Option<bool>,
}

/// Uniform access to the `uninterpreted_option` list every options message
/// carries, so the option interpreter can be generic over the attach point.
pub(crate) trait OptionsMessage: Message + Default {
    fn uninterpreted(&self) -> &[UninterpretedOption];
    fn uninterpreted_mut(&mut self) -> &mut Vec<UninterpretedOption>;
}

macro_rules! options_message {
    ($($ty:ty),* $(,)?) => {
        $(impl OptionsMessage for $ty {
            fn uninterpreted(&self) -> &[UninterpretedOption] {
                &self.uninterpreted_option
            }

            fn uninterpreted_mut(&mut self) -> &mut Vec<UninterpretedOption> {
                &mut self.uninterpreted_option
            }
        })*
    };
}

options_message!(
    FileOptions,
    MessageOptions,
    FieldOptions,
    OneofOptions,
    EnumOptions,
    EnumValueOptions,
    ExtensionRangeOptions,
    ServiceOptions,
    MethodOptions,
);

/// An options message holding both the typed value and its full encoded
/// form. Encoding writes the raw bytes, so extension fields set by the
/// option interpreter are preserved even though `T` has no slot for them.
#[derive(Clone, Default, PartialEq)]
pub struct Options<T> {
    pub(crate) encoded: Vec<u8>,
    pub(crate) value: T,
}

impl<T> Options<T>
where
    T: Message + Default,
{
    /// Wraps a typed options value that has no extension fields.
    pub(crate) fn new(value: T) -> Self {
        Options {
            encoded: value.encode_to_vec(),
            value,
        }
    }

    /// Builds the wrapper from encoded bytes that may contain extension
    /// fields; the typed value keeps the fields `T` knows about.
    pub(crate) fn from_encoded(encoded: Vec<u8>) -> Result<Self, DecodeError> {
        let value = T::decode(encoded.as_slice())?;
        Ok(Options { encoded, value })
    }

    /// The typed view of the options, without extension fields.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// The full encoded options message, including extension fields.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

impl<T> fmt::Debug for Options<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T> Message for Options<T>
where
    T: Message + Default,
{
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        buf.put(self.encoded.as_slice());
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        // Move the field's raw bytes into `encoded` first, then let the
        // typed value merge from the captured copy.
        encode_key(tag, wire_type, &mut self.encoded);
        let start = self.encoded.len();
        copy_field(wire_type, tag, buf, &mut self.encoded)?;
        self.value
            .merge_field(tag, wire_type, &mut &self.encoded[start..], ctx)
    }

    fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    fn clear(&mut self) {
        self.encoded.clear();
        self.value.clear();
    }
}

/// Transfers one wire-format field from `buf` to `out`, consuming exactly
/// the field's bytes. Varints are re-encoded (normalizing any overlong
/// encoding); fixed-width and length-delimited payloads are copied through;
/// groups are walked member by member until the matching end tag.
fn copy_field<B: Buf>(
    wire_type: WireType,
    tag: u32,
    buf: &mut B,
    out: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    match wire_type {
        WireType::Varint => {
            let value = decode_varint(buf)?;
            encode_varint(value, out);
        }
        WireType::SixtyFourBit => copy_bytes(buf, 8, out)?,
        WireType::ThirtyTwoBit => copy_bytes(buf, 4, out)?,
        WireType::LengthDelimited => {
            let len = decode_varint(buf)?;
            let len = usize::try_from(len)
                .map_err(|_| DecodeError::new("length delimiter exceeds address space"))?;
            encode_varint(len as u64, out);
            copy_bytes(buf, len, out)?;
        }
        WireType::StartGroup => loop {
            let (member_tag, member_wire) = decode_key(buf)?;
            encode_key(member_tag, member_wire, out);
            if member_wire == WireType::EndGroup {
                if member_tag != tag {
                    return Err(DecodeError::new("unexpected end group tag"));
                }
                break;
            }
            copy_field(member_wire, member_tag, buf, out)?;
        },
        WireType::EndGroup => return Err(DecodeError::new("unexpected end group tag")),
    }
    Ok(())
}

fn copy_bytes<B: Buf>(buf: &mut B, len: usize, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    if buf.remaining() < len {
        return Err(DecodeError::new("buffer underflow"));
    }
    out.put(buf.take(len));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_unknown_fields() {
        // A FileOptions message with java_package (tag 1) and an extension
        // field (tag 50000, varint value 7) that the typed struct cannot
        // represent.
        let mut encoded = Vec::new();
        let typed = FileOptions {
            java_package: Some("com.example".to_owned()),
            ..Default::default()
        };
        typed.encode(&mut encoded).unwrap();
        encode_key(50000, WireType::Varint, &mut encoded);
        prost::encoding::encode_varint(7, &mut encoded);

        let options = Options::<FileOptions>::from_encoded(encoded.clone()).unwrap();
        assert_eq!(options.get().java_package(), "com.example");
        assert_eq!(options.encoded(), &encoded[..]);

        // Re-encoding emits the extension bytes.
        assert_eq!(options.encode_to_vec(), encoded);

        // Decoding through the Message impl retains them too.
        let mut framed = Vec::new();
        options.encode_length_delimited(&mut framed).unwrap();
        let decoded =
            Options::<FileOptions>::decode_length_delimited(framed.as_slice()).unwrap();
        assert_eq!(decoded.encoded(), &encoded[..]);
        assert_eq!(decoded.get().java_package(), "com.example");
    }
}
