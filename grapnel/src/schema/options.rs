use prost_reflect::SerializeOptions;
use std::path::PathBuf;

/// How 64-bit integer fields are rendered in JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Int64Representation {
    /// Render as JSON strings, avoiding precision loss above 2^53.
    #[default]
    String,
    /// Render as native JSON numbers.
    Number,
}

/// How enum fields are rendered in JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumRepresentation {
    /// Render as the enum value name, e.g. `"GRADE_PREMIUM"`.
    #[default]
    String,
    /// Render as the numeric enum value.
    Number,
}

/// Options controlling how a schema is loaded and how its messages are
/// transcoded between JSON and Protobuf.
///
/// The defaults favour lossless, schema-faithful JSON: original field names,
/// stringified 64-bit integers, named enum values, and explicit defaults.
/// Inbound JSON is always accepted in both spellings (original and
/// lowerCamelCase names, string and numeric scalars); these options govern the
/// outbound rendering only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLoadOptions {
    /// Keep the original `.proto` field names instead of lowerCamelCase.
    pub preserve_field_casing: bool,
    /// Rendering of `int64`/`uint64`/`sint64`/`fixed64` fields.
    pub int64_representation: Int64Representation,
    /// Rendering of enum fields.
    pub enum_representation: EnumRepresentation,
    /// Emit fields carrying their default value instead of omitting them.
    pub apply_field_defaults: bool,
    /// Accepted for configuration compatibility; `oneof` groups are always
    /// modeled as tagged unions by the descriptor layer.
    pub union_field_grouping: bool,
    /// Extra import roots used when compiling `.proto` sources. The schema
    /// file's own directory is always an implicit, lowest-priority root.
    pub include_paths: Vec<PathBuf>,
}

impl Default for SchemaLoadOptions {
    fn default() -> Self {
        Self {
            preserve_field_casing: true,
            int64_representation: Int64Representation::String,
            enum_representation: EnumRepresentation::String,
            apply_field_defaults: true,
            union_field_grouping: true,
            include_paths: Vec::new(),
        }
    }
}

impl SchemaLoadOptions {
    pub(crate) fn transcode(&self) -> TranscodeOptions {
        TranscodeOptions {
            preserve_field_casing: self.preserve_field_casing,
            int64_representation: self.int64_representation,
            enum_representation: self.enum_representation,
            apply_field_defaults: self.apply_field_defaults,
            union_field_grouping: self.union_field_grouping,
        }
    }
}

/// The transcoding subset of [`SchemaLoadOptions`], carried by every
/// [`ServiceSchema`](super::ServiceSchema) resolved from a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub preserve_field_casing: bool,
    pub int64_representation: Int64Representation,
    pub enum_representation: EnumRepresentation,
    pub apply_field_defaults: bool,
    pub union_field_grouping: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        SchemaLoadOptions::default().transcode()
    }
}

impl TranscodeOptions {
    /// Maps these options onto `prost-reflect`'s JSON serializer settings.
    pub(crate) fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::new()
            .use_proto_field_name(self.preserve_field_casing)
            .stringify_64_bit_integers(matches!(
                self.int64_representation,
                Int64Representation::String
            ))
            .use_enum_numbers(matches!(self.enum_representation, EnumRepresentation::Number))
            .skip_default_fields(!self.apply_field_defaults)
    }
}
