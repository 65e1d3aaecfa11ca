//! # JSON <-> Protobuf codec
//!
//! This module implements `tonic::codec::Codec` to let `tonic` transport
//! `serde_json::Value` directly, bypassing the need for generated Rust
//! structs.
//!
//! ## How it works
//!
//! 1. **Encoder (JSON -> Proto)**:
//!    - Takes a `serde_json::Value`.
//!    - Uses `prost_reflect::DynamicMessage` to validate the JSON against the
//!      message descriptor.
//!    - Serializes the valid message into the generic gRPC byte buffer.
//!
//! 2. **Decoder (Proto -> JSON)**:
//!    - Reads raw bytes from the wire.
//!    - Decodes them into a `DynamicMessage` using the message descriptor.
//!    - Renders the message as `serde_json::Value`, honouring the
//!      [`TranscodeOptions`] of the schema this side was loaded with.
//!
//! The codec is directional: [`JsonCodec::client`] encodes requests and
//! decodes responses, [`JsonCodec::server`] the other way around.
use crate::schema::TranscodeOptions;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec that bridges `serde_json::Value` and Protobuf binary format for
/// one method of one service.
pub struct JsonCodec {
    /// Schema for the message this side sends.
    encode_desc: MessageDescriptor,
    /// Schema for the message this side receives.
    decode_desc: MessageDescriptor,
    transcode: TranscodeOptions,
}

impl JsonCodec {
    /// Codec for the calling side: encodes the method input, decodes its
    /// output.
    pub fn client(method: &MethodDescriptor, transcode: TranscodeOptions) -> Self {
        Self {
            encode_desc: method.input(),
            decode_desc: method.output(),
            transcode,
        }
    }

    /// Codec for the serving side: decodes the method input, encodes its
    /// output.
    pub fn server(method: &MethodDescriptor, transcode: TranscodeOptions) -> Self {
        Self {
            encode_desc: method.output(),
            decode_desc: method.input(),
            transcode,
        }
    }
}

impl Codec for JsonCodec {
    type Encode = serde_json::Value;
    type Decode = serde_json::Value;

    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(self.encode_desc.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder {
            desc: self.decode_desc.clone(),
            transcode: self.transcode,
        }
    }
}

/// Responsible for encoding a JSON value into Protobuf bytes.
pub struct JsonEncoder(MessageDescriptor);

impl Encoder for JsonEncoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        // DynamicMessage::deserialize accepts any Serde Deserializer.
        // serde_json::Value implements IntoDeserializer, so we can pass it
        // directly. The parser accepts both original and lowerCamelCase field
        // names, and both string and numeric scalar spellings.
        let msg = DynamicMessage::deserialize(self.0.clone(), item).map_err(|e| {
            Status::invalid_argument(format!("JSON value does not match the message schema: {e}"))
        })?;

        msg.encode_raw(dst);
        Ok(())
    }
}

/// Responsible for decoding Protobuf bytes into a JSON value.
pub struct JsonDecoder {
    desc: MessageDescriptor,
    transcode: TranscodeOptions,
}

impl Decoder for JsonDecoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.desc.clone());
        msg.merge(src)
            .map_err(|e| Status::internal(format!("failed to decode Protobuf message: {e}")))?;

        let value = msg
            .serialize_with_options(
                serde_json::value::Serializer,
                &self.transcode.serialize_options(),
            )
            .map_err(|e| Status::internal(format!("failed to render message as JSON: {e}")))?;

        Ok(Some(value))
    }
}
