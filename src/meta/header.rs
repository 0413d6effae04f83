
//! The header of a part: required attributes, standard optional attributes,
//! and arbitrary custom attributes.

use std::collections::BTreeMap;

use crate::compression::Compression;
use crate::error::*;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{self, *};
use crate::meta::{compute_chunk_count, sequence_end, Requirements};


/// Describes a single part in a file. A file has one or more parts.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// The channels stored in this part. Iteration order is insertion order;
    /// the file itself always stores channels sorted by name.
    pub channels: ChannelList,

    /// How the pixel data of all channels is compressed.
    pub compression: Compression,

    /// The rectangle of pixels that is actually stored.
    pub data_window: IntegerBounds,

    /// The canvas that the data window is composited onto by viewers.
    pub display_window: IntegerBounds,

    /// In what order the chunks appear in the file.
    pub line_order: LineOrder,

    /// Aspect ratio of each pixel in this part.
    pub pixel_aspect: f32,

    /// Part of the perspective projection. Default is `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Part of the perspective projection. Default is `1`.
    pub screen_window_width: f32,

    /// How the image is divided into tiles, if this part is tiled.
    pub tiles: Option<TileDescription>,

    /// The kind of this part. Required for multi-part and deep files.
    pub block_type: Option<BlockType>,

    /// The name of this part. Required for multi-part files.
    pub name: Option<Text>,

    /// The view this part belongs to, usually `left` or `right`.
    pub view: Option<Text>,

    /// The view names of a multi-view image, for example stereo.
    pub multi_view: Option<Vec<Text>>,

    /// The color space of the pixels in this part.
    pub chromaticities: Option<Chromaticities>,

    /// The CIE (x, y) coordinates that should be considered neutral.
    pub adopted_neutral: Option<Vec2<f32>>,

    /// The luminance in nits of the rgb value `(1, 1, 1)`.
    pub white_luminance: Option<f32>,

    /// If present, how this image is projected onto an environment.
    pub environment_map: Option<EnvironmentMap>,

    /// The SMPTE time code of the image.
    pub time_code: Option<TimeCode>,

    /// Film manufacturer, type, roll and frame position within the roll.
    pub key_code: Option<KeyCode>,

    /// Frames per second if this is a frame in a sequence.
    pub frames_per_second: Option<Rational>,

    /// An 8-bit rgba preview of the image.
    pub preview: Option<Preview>,

    /// Name of the owner.
    pub owner: Option<Text>,

    /// Additional textual information.
    pub comments: Option<Text>,

    /// The date of image creation, in `YYYY:MM:DD hh:mm:ss` format.
    pub capture_date: Option<Text>,

    /// Time offset from UTC in hours.
    pub utc_offset: Option<f32>,

    /// The horizontal output density, in pixels per inch.
    pub x_density: Option<f32>,

    /// How texture map images are extrapolated:
    /// `black`, `clamp`, `periodic`, or `mirror`.
    pub wrap_modes: Option<Text>,

    /// World to camera space transform, row-major.
    pub world_to_camera: Option<[f32; 16]>,

    /// World to normalized device coordinate transform, row-major.
    pub world_to_ndc: Option<[f32; 16]>,

    /// Quantization level of DWA compressed parts.
    pub dwa_compression_level: Option<f32>,

    /// All attributes that are not handled by the typed fields above.
    /// Sorted by name, so that serialization is deterministic.
    pub custom_attributes: BTreeMap<Text, AttributeValue>,
}


/// Contains the reserved attribute names, as byte string literals.
pub mod attribute_names {
    macro_rules! define_required_attribute_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte string name of this attribute as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_required_attribute_names! {
        CHANNELS:               b"channels",
        COMPRESSION:            b"compression",
        DATA_WINDOW:            b"dataWindow",
        DISPLAY_WINDOW:         b"displayWindow",
        LINE_ORDER:             b"lineOrder",
        PIXEL_ASPECT:           b"pixelAspectRatio",
        WINDOW_CENTER:          b"screenWindowCenter",
        WINDOW_WIDTH:           b"screenWindowWidth",
        TILES:                  b"tiles",
        BLOCK_TYPE:             b"type",
        NAME:                   b"name",
        VIEW:                   b"view",
        MULTI_VIEW:             b"multiView",
        CHROMATICITIES:         b"chromaticities",
        ADOPTED_NEUTRAL:        b"adoptedNeutral",
        WHITE_LUMINANCE:        b"whiteLuminance",
        ENVIRONMENT_MAP:        b"envmap",
        TIME_CODE:              b"timeCode",
        KEY_CODE:               b"keyCode",
        FRAMES_PER_SECOND:      b"framesPerSecond",
        PREVIEW:                b"preview",
        OWNER:                  b"owner",
        COMMENTS:               b"comments",
        CAPTURE_DATE:           b"capDate",
        UTC_OFFSET:             b"utcOffset",
        X_DENSITY:              b"xDensity",
        WRAP_MODES:             b"wrapmodes",
        WORLD_TO_CAMERA:        b"worldToCamera",
        WORLD_TO_NDC:           b"worldToNDC",
        DWA_COMPRESSION_LEVEL:  b"dwaCompressionLevel"
    }
}

fn missing_attribute(name: &str) -> Error {
    Error::malformed(format!("missing or invalid {} attribute", name))
}


impl Header {

    /// Create a header for a scan line part with the specified channels and
    /// data window. The other attributes start out with their default values.
    pub fn new(channels: ChannelList, data_window: IntegerBounds) -> Self {
        Self {
            channels,
            data_window,
            display_window: data_window,

            compression: Compression::Uncompressed,
            line_order: LineOrder::IncreasingY,
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,

            tiles: None,
            block_type: None,
            name: None,
            view: None,
            multi_view: None,
            chromaticities: None,
            adopted_neutral: None,
            white_luminance: None,
            environment_map: None,
            time_code: None,
            key_code: None,
            frames_per_second: None,
            preview: None,
            owner: None,
            comments: None,
            capture_date: None,
            utc_offset: None,
            x_density: None,
            wrap_modes: None,
            world_to_camera: None,
            world_to_ndc: None,
            dwa_compression_level: None,
            custom_attributes: BTreeMap::new(),
        }
    }

    /// Set the compression method of this header.
    pub fn with_compression(self, compression: Compression) -> Self {
        Self { compression, ..self }
    }

    /// Make this a tiled part with the specified tile description.
    pub fn with_tiles(self, tiles: TileDescription) -> Self {
        Self { tiles: Some(tiles), ..self }
    }

    /// Set the block type of this header.
    pub fn with_block_type(self, block_type: BlockType) -> Self {
        Self { block_type: Some(block_type), ..self }
    }

    /// Set the part name of this header.
    pub fn with_name(self, name: Text) -> Self {
        Self { name: Some(name), ..self }
    }

    /// Set the line order of this header.
    pub fn with_line_order(self, line_order: LineOrder) -> Self {
        Self { line_order, ..self }
    }

    /// Insert a custom attribute.
    pub fn with_attribute(mut self, name: Text, value: AttributeValue) -> Self {
        self.custom_attributes.insert(name, value);
        self
    }

    /// The number of chunks of this part, including all resolution levels.
    pub fn chunk_count(&self) -> usize {
        compute_chunk_count(self.compression, self.data_window.size, self.tiles)
    }

    /// The resolution of the data window.
    pub fn data_size(&self) -> Vec2<usize> {
        self.data_window.size
    }

    /// The dimensions of a full-sized block of this part:
    /// the tile size, or the scan line chunk rectangle.
    pub fn default_block_size(&self) -> Vec2<usize> {
        match self.tiles {
            Some(tiles) => tiles.tile_size,
            None => Vec2(self.data_window.size.width(), self.compression.scan_lines_per_chunk()),
        }
    }

    /// The maximum number of bytes of an uncompressed block, used to cap allocations.
    pub fn max_block_byte_size(&self) -> usize {
        let block = self.default_block_size();
        self.channels.bytes_per_pixel * block.area().max(1) + 1024
    }

    /// Whether long attribute and channel names are used in this header.
    pub fn contains_long_names(&self) -> bool {
        let mut long = false;

        let mut check = |bytes: &[u8]| {
            if bytes.len() >= 32 { long = true; }
        };

        for channel in &self.channels.list { check(channel.name.bytes()); }
        for name in self.custom_attributes.keys() { check(name.bytes()); }
        if let Some(name) = &self.name { check(name.bytes()); }

        long
    }

    /// Validate this header against the file requirements.
    pub fn validate(&self, requirements: &Requirements) -> UnitResult {
        self.data_window.validate(None)?;
        self.display_window.validate(None)?;

        if self.data_window.is_empty() {
            return Err(Error::malformed("empty data window"));
        }

        if !self.pixel_aspect.is_finite() || self.pixel_aspect < 1.0e-6 || self.pixel_aspect > 1.0e6 {
            return Err(Error::attribute("pixel aspect ratio"));
        }

        if self.screen_window_width < 0.0 {
            return Err(Error::attribute("screen window width"));
        }

        let is_tiled = self.blocks_are_tiles();

        if let Some(tiles) = self.tiles {
            tiles.validate()?;
        }

        if let Some(block_type) = self.block_type {
            if block_type.is_tiled() != self.tiles.is_some() {
                return Err(missing_attribute("tiles"));
            }
        }

        if self.line_order == LineOrder::RandomY && !is_tiled {
            return Err(Error::attribute("random line order in scan line part"));
        }

        if requirements.is_multipart() && (self.block_type.is_none() || self.name.is_none()) {
            return Err(missing_attribute("type and name for multi-part file"));
        }

        if self.is_deep() {
            if self.block_type.is_none() {
                return Err(missing_attribute("type for deep data"));
            }

            if !self.compression.supports_deep_data() {
                return Err(Error::unsupported("deep data with a lossy compression method"));
            }
        }

        // subsampling is only allowed in flat scan line parts
        let allow_sampling = !is_tiled && !self.is_deep();
        self.channels.validate(allow_sampling, self.data_window)?;

        let mut long_names = requirements.has_long_names;
        for (name, value) in &self.custom_attributes {
            attribute::validate(name, value, &mut long_names, allow_sampling, self.data_window)?;
        }

        if long_names && !requirements.has_long_names {
            return Err(Error::malformed("long attribute names without the long name flag"));
        }

        Ok(())
    }

    /// Read all headers of the file, one for a single-part file,
    /// or a terminated sequence for multi-part files.
    pub fn read_all(read: &mut PeekRead<impl Read>, requirements: &Requirements) -> Result<super::Headers> {
        if !requirements.is_multipart() {
            Ok(smallvec![ Header::read(read, requirements)? ])
        }
        else {
            let mut headers = smallvec::SmallVec::new();

            while !sequence_end::has_come(read)? {
                headers.push(Header::read(read, requirements)?);
            }

            Ok(headers)
        }
    }

    /// Without validation, write all headers, and the extra
    /// terminator for multi-part files.
    pub fn write_all(headers: &[Header], write: &mut impl Write, is_multipart: bool) -> UnitResult {
        for header in headers {
            header.write(write)?;
        }

        if is_multipart {
            sequence_end::write(write)?;
        }

        Ok(())
    }

    /// Read the attribute sequence of one header.
    pub fn read(read: &mut PeekRead<impl Read>, requirements: &Requirements) -> Result<Self> {
        let max_string_len = if requirements.has_long_names { 256 } else { 32 };

        // these required attributes will be filled when encountered while parsing
        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect = None;
        let mut screen_window_center = None;
        let mut screen_window_width = None;

        let mut header = Header::new(ChannelList::new(smallvec![]), IntegerBounds::zero());

        while !sequence_end::has_come(read)? {
            let (attribute_name, value) = attribute::read(read, max_string_len)?;

            // a decoding error of a single attribute must not poison the
            // rest of the header, the stream itself is still intact
            let value = value?;

            use crate::meta::header::attribute_names as name;
            use crate::meta::attribute::AttributeValue::*;

            match (attribute_name.bytes(), value) {
                (name::CHANNELS, ChannelList(value)) => channels = Some(value),
                (name::COMPRESSION, Compression(value)) => compression = Some(value),
                (name::DATA_WINDOW, IntegerBounds(value)) => data_window = Some(value),
                (name::DISPLAY_WINDOW, IntegerBounds(value)) => display_window = Some(value),
                (name::LINE_ORDER, LineOrder(value)) => line_order = Some(value),
                (name::PIXEL_ASPECT, F32(value)) => pixel_aspect = Some(value),
                (name::WINDOW_CENTER, FloatVec2(value)) => screen_window_center = Some(value),
                (name::WINDOW_WIDTH, F32(value)) => screen_window_width = Some(value),

                (name::TILES, TileDescription(value)) => header.tiles = Some(value),
                (name::BLOCK_TYPE, Text(value)) => header.block_type = Some(attribute::BlockType::parse(&value)?),
                (name::NAME, Text(value)) => header.name = Some(value),
                (name::VIEW, Text(value)) => header.view = Some(value),
                (name::MULTI_VIEW, TextVector(value)) => header.multi_view = Some(value),
                (name::CHROMATICITIES, Chromaticities(value)) => header.chromaticities = Some(value),
                (name::ADOPTED_NEUTRAL, FloatVec2(value)) => header.adopted_neutral = Some(value),
                (name::WHITE_LUMINANCE, F32(value)) => header.white_luminance = Some(value),
                (name::ENVIRONMENT_MAP, EnvironmentMap(value)) => header.environment_map = Some(value),
                (name::TIME_CODE, TimeCode(value)) => header.time_code = Some(value),
                (name::KEY_CODE, KeyCode(value)) => header.key_code = Some(value),
                (name::FRAMES_PER_SECOND, Rational(value)) => header.frames_per_second = Some(value),
                (name::PREVIEW, Preview(value)) => header.preview = Some(value),
                (name::OWNER, Text(value)) => header.owner = Some(value),
                (name::COMMENTS, Text(value)) => header.comments = Some(value),
                (name::CAPTURE_DATE, Text(value)) => header.capture_date = Some(value),
                (name::UTC_OFFSET, F32(value)) => header.utc_offset = Some(value),
                (name::X_DENSITY, F32(value)) => header.x_density = Some(value),
                (name::WRAP_MODES, Text(value)) => header.wrap_modes = Some(value),
                (name::WORLD_TO_CAMERA, Matrix4x4(value)) => header.world_to_camera = Some(value),
                (name::WORLD_TO_NDC, Matrix4x4(value)) => header.world_to_ndc = Some(value),
                (name::DWA_COMPRESSION_LEVEL, F32(value)) => header.dwa_compression_level = Some(value),

                // preserve unknown attributes, and known attributes with unusual types
                (_, value) => {
                    header.custom_attributes.insert(attribute_name, value);
                },
            }
        }

        header.channels = channels.ok_or_else(|| missing_attribute("channels"))?;
        header.compression = compression.ok_or_else(|| missing_attribute("compression"))?;
        header.data_window = data_window.ok_or_else(|| missing_attribute("dataWindow"))?;
        header.display_window = display_window.ok_or_else(|| missing_attribute("displayWindow"))?;
        header.line_order = line_order.ok_or_else(|| missing_attribute("lineOrder"))?;
        header.pixel_aspect = pixel_aspect.ok_or_else(|| missing_attribute("pixelAspectRatio"))?;
        header.screen_window_center = screen_window_center.ok_or_else(|| missing_attribute("screenWindowCenter"))?;
        header.screen_window_width = screen_window_width.ok_or_else(|| missing_attribute("screenWindowWidth"))?;

        Ok(header)
    }

    /// Without validation, write the attribute sequence of this header,
    /// followed by the terminator. Attributes are written in ascending
    /// name order, so identical headers serialize byte-identically.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        use crate::meta::header::attribute_names as name;
        use crate::meta::attribute::AttributeValue::*;

        let mut attributes: Vec<(&[u8], AttributeValue)> = Vec::with_capacity(16 + self.custom_attributes.len());

        // the channels must be sorted on disk, no matter the in-memory order
        attributes.push((name::CHANNELS, ChannelList(self.channels.sorted_for_file())));
        attributes.push((name::COMPRESSION, Compression(self.compression)));
        attributes.push((name::DATA_WINDOW, IntegerBounds(self.data_window)));
        attributes.push((name::DISPLAY_WINDOW, IntegerBounds(self.display_window)));
        attributes.push((name::LINE_ORDER, LineOrder(self.line_order)));
        attributes.push((name::PIXEL_ASPECT, F32(self.pixel_aspect)));
        attributes.push((name::WINDOW_CENTER, FloatVec2(self.screen_window_center)));
        attributes.push((name::WINDOW_WIDTH, F32(self.screen_window_width)));

        if let Some(value) = self.tiles { attributes.push((name::TILES, TileDescription(value))); }
        if let Some(value) = self.block_type { attributes.push((name::BLOCK_TYPE, Text(value.to_text()))); }
        if let Some(value) = &self.name { attributes.push((name::NAME, Text(value.clone()))); }
        if let Some(value) = &self.view { attributes.push((name::VIEW, Text(value.clone()))); }
        if let Some(value) = &self.multi_view { attributes.push((name::MULTI_VIEW, TextVector(value.clone()))); }
        if let Some(value) = self.chromaticities { attributes.push((name::CHROMATICITIES, Chromaticities(value))); }
        if let Some(value) = self.adopted_neutral { attributes.push((name::ADOPTED_NEUTRAL, FloatVec2(value))); }
        if let Some(value) = self.white_luminance { attributes.push((name::WHITE_LUMINANCE, F32(value))); }
        if let Some(value) = self.environment_map { attributes.push((name::ENVIRONMENT_MAP, EnvironmentMap(value))); }
        if let Some(value) = self.time_code { attributes.push((name::TIME_CODE, TimeCode(value))); }
        if let Some(value) = self.key_code { attributes.push((name::KEY_CODE, KeyCode(value))); }
        if let Some(value) = self.frames_per_second { attributes.push((name::FRAMES_PER_SECOND, Rational(value))); }
        if let Some(value) = &self.preview { attributes.push((name::PREVIEW, Preview(value.clone()))); }
        if let Some(value) = &self.owner { attributes.push((name::OWNER, Text(value.clone()))); }
        if let Some(value) = &self.comments { attributes.push((name::COMMENTS, Text(value.clone()))); }
        if let Some(value) = &self.capture_date { attributes.push((name::CAPTURE_DATE, Text(value.clone()))); }
        if let Some(value) = self.utc_offset { attributes.push((name::UTC_OFFSET, F32(value))); }
        if let Some(value) = self.x_density { attributes.push((name::X_DENSITY, F32(value))); }
        if let Some(value) = &self.wrap_modes { attributes.push((name::WRAP_MODES, Text(value.clone()))); }
        if let Some(value) = self.world_to_camera { attributes.push((name::WORLD_TO_CAMERA, Matrix4x4(value))); }
        if let Some(value) = self.world_to_ndc { attributes.push((name::WORLD_TO_NDC, Matrix4x4(value))); }
        if let Some(value) = self.dwa_compression_level { attributes.push((name::DWA_COMPRESSION_LEVEL, F32(value))); }

        for (attribute_name, value) in &self.custom_attributes {
            attributes.push((attribute_name.bytes(), value.clone()));
        }

        attributes.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (attribute_name, value) in &attributes {
            attribute::write(attribute_name, value, write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }
}
