
//! Writing and reading of images in the ACES interchange format:
//! scan lines, restricted compression methods, and colorimetry
//! converted to the ACES primaries on read.

use std::io::{Read, Seek, Write};

use crate::compression::Compression;
use crate::error::{Error, Result, UnitResult};
use crate::frame::FrameBuffer;
use crate::math::{Matrix3, Vec2, Vec3};
use crate::meta::attribute::{Chromaticities, Text};
use crate::meta::header::Header;
use crate::pixel::luma::is_yc_channel_list;
use crate::scanline::{ScanlineReader, ScanlineWriter};


/// The chromaticities of the ACES color space.
pub const ACES_CHROMATICITIES: Chromaticities = Chromaticities {
    red: Vec2(0.73470, 0.26530),
    green: Vec2(0.00000, 1.00000),
    blue: Vec2(0.00010, -0.07700),
    white: Vec2(0.32168, 0.33767),
};

/// The chromaticities of Rec. ITU-R BT.709-3, which are assumed
/// for files that carry no chromaticities attribute.
pub const REC_709_CHROMATICITIES: Chromaticities = Chromaticities {
    red: Vec2(0.6400, 0.3300),
    green: Vec2(0.3000, 0.6000),
    blue: Vec2(0.1500, 0.0600),
    white: Vec2(0.3127, 0.3290),
};

/// The Bradford cone response matrix, transforming CIE XYZ to an LMS-like space.
const BRADFORD: Matrix3 = Matrix3([
    0.8951, 0.2664, -0.1614,
    -0.7502, 1.7135, 0.0367,
    0.0389, -0.0685, 1.0296,
]);


/// The XYZ coordinates of a chromaticity, scaled to `Y == 1`.
fn chromaticity_to_xyz(chromaticity: Vec2<f32>) -> Vec3<f64> {
    let x = f64::from(chromaticity.x());
    let y = f64::from(chromaticity.y());

    Vec3(x / y, 1.0, (1.0 - x - y) / y)
}

/// The matrix converting rgb values with the specified chromaticities to
/// CIE XYZ: the primaries are scaled so that `(1, 1, 1)` maps to the
/// white point with `Y == 1`.
pub fn rgb_to_xyz(chromaticities: &Chromaticities) -> Result<Matrix3> {
    let primary = |chromaticity: Vec2<f32>| Vec3(
        f64::from(chromaticity.x()),
        f64::from(chromaticity.y()),
        1.0 - f64::from(chromaticity.x()) - f64::from(chromaticity.y()),
    );

    let red = primary(chromaticities.red);
    let green = primary(chromaticities.green);
    let blue = primary(chromaticities.blue);

    // the columns of the unscaled matrix are the primaries
    let primaries = Matrix3([
        red.0, green.0, blue.0,
        red.1, green.1, blue.1,
        red.2, green.2, blue.2,
    ]);

    // solve for the per-primary scale that maps white to (Xw, 1, Zw)
    let white = chromaticity_to_xyz(chromaticities.white);

    let scale = primaries.inverse()
        .ok_or_else(|| Error::attribute("degenerate chromaticities"))?
        .transform(white);

    Ok(Matrix3([
        red.0 * scale.0, green.0 * scale.1, blue.0 * scale.2,
        red.1 * scale.0, green.1 * scale.1, blue.1 * scale.2,
        red.2 * scale.0, green.2 * scale.1, blue.2 * scale.2,
    ]))
}

/// The matrix converting CIE XYZ to rgb values with the specified chromaticities.
pub fn xyz_to_rgb(chromaticities: &Chromaticities) -> Result<Matrix3> {
    rgb_to_xyz(chromaticities)?.inverse()
        .ok_or_else(|| Error::attribute("degenerate chromaticities"))
}

/// The Bradford chromatic adaptation from one white point to another:
/// both whites are transformed into the cone response space, their
/// component-wise ratio forms a diagonal scale, and the result is
/// transformed back.
pub fn bradford_adaptation(source_white: Vec2<f32>, destination_white: Vec2<f32>) -> Result<Matrix3> {
    let source = BRADFORD.transform(chromaticity_to_xyz(source_white));
    let destination = BRADFORD.transform(chromaticity_to_xyz(destination_white));

    if source.0 == 0.0 || source.1 == 0.0 || source.2 == 0.0 {
        return Err(Error::attribute("degenerate white point"));
    }

    let ratio = Matrix3([
        destination.0 / source.0, 0.0, 0.0,
        0.0, destination.1 / source.1, 0.0,
        0.0, 0.0, destination.2 / source.2,
    ]);

    let inverse_bradford = BRADFORD.inverse().expect("the bradford matrix is invertible");
    Ok(inverse_bradford.multiply(&ratio).multiply(&BRADFORD))
}

/// Whether the chromaticities and the adopted neutral already
/// match the ACES color space.
pub fn matches_aces(chromaticities: &Chromaticities, adopted_neutral: Option<Vec2<f32>>) -> bool {
    let close = |a: Vec2<f32>, b: Vec2<f32>| {
        (a.x() - b.x()).abs() < 1e-4 && (a.y() - b.y()).abs() < 1e-4
    };

    close(chromaticities.red, ACES_CHROMATICITIES.red)
        && close(chromaticities.green, ACES_CHROMATICITIES.green)
        && close(chromaticities.blue, ACES_CHROMATICITIES.blue)
        && close(chromaticities.white, ACES_CHROMATICITIES.white)
        && adopted_neutral.map_or(true, |neutral| close(neutral, ACES_CHROMATICITIES.white))
}

/// The matrix converting pixels of a file with the specified colorimetry
/// to the ACES color space: file rgb to XYZ, Bradford adaptation of the
/// adopted neutral to the ACES white, then XYZ to ACES rgb.
pub fn file_to_aces_matrix(chromaticities: &Chromaticities, adopted_neutral: Option<Vec2<f32>>) -> Result<Matrix3> {
    let file_neutral = adopted_neutral.unwrap_or(chromaticities.white);

    let to_xyz = rgb_to_xyz(chromaticities)?;
    let adaptation = bradford_adaptation(file_neutral, ACES_CHROMATICITIES.white)?;
    let to_aces = xyz_to_rgb(&ACES_CHROMATICITIES)?;

    Ok(to_aces.multiply(&adaptation).multiply(&to_xyz))
}


fn channel_name(text: &str) -> Text {
    Text::new(text).expect("channel name is valid ascii")
}

/// Whether the channel list is one of the combinations the ACES
/// container allows: `R`, `G`, `B` or `Y`, `RY`, `BY`, optionally
/// with an `A` channel.
fn is_aces_channel_list(header: &Header) -> bool {
    let channels = &header.channels;

    let allowed_extra = |without: &[&str]| channels.list.iter().all(|channel| {
        without.iter().any(|&name| channel.name.eq(name)) || channel.name.eq("A")
    });

    let is_rgb = channels.find(&channel_name("R")).is_some()
        && channels.find(&channel_name("G")).is_some()
        && channels.find(&channel_name("B")).is_some()
        && allowed_extra(&["R", "G", "B"]);

    let is_yc = is_yc_channel_list(channels) && allowed_extra(&["Y", "RY", "BY"]);

    is_rgb || is_yc
}


/// Writes a scan line image in the ACES interchange format.
/// The header is restricted to the allowed compression methods and
/// channels, and the ACES colorimetry attributes are injected.
#[derive(Debug)]
#[must_use]
pub struct AcesWriter<W: Write + Seek> {
    inner: ScanlineWriter<W>,
}

impl<W: Write + Seek> AcesWriter<W> {

    /// Restrict and annotate the specified header, and write its meta data.
    pub fn new(write: W, header: Header) -> Result<Self> {
        match header.compression {
            Compression::Uncompressed | Compression::PIZ | Compression::B44A => {},
            _ => return Err(Error::unsupported("compression method not allowed in aces files")),
        }

        if header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("aces files contain flat scan lines"));
        }

        if !is_aces_channel_list(&header) {
            return Err(Error::unsupported("aces files contain rgb or luminance/chroma channels"));
        }

        let header = Header {
            chromaticities: Some(ACES_CHROMATICITIES),
            adopted_neutral: Some(ACES_CHROMATICITIES.white),
            ..header
        };

        Ok(Self { inner: ScanlineWriter::new(write, header)? })
    }

    /// The header of the image being written.
    pub fn header(&self) -> &Header { self.inner.header() }

    /// Compress and write all pixels of the data window.
    pub fn write_pixels(&mut self, frame_buffer: &FrameBuffer) -> UnitResult {
        self.inner.write_pixels(frame_buffer)
    }

    /// Finalize the offset table.
    pub fn finish(self) -> Result<W> {
        self.inner.finish()
    }
}


/// Reads a scan line image and converts its pixels to the
/// ACES color space if its colorimetry differs.
#[derive(Debug)]
pub struct AcesReader<R: Read + Seek> {
    inner: ScanlineReader<R>,
    conversion: Option<Matrix3>,
}

impl<R: Read + Seek> AcesReader<R> {

    /// Parse the meta data and derive the color conversion.
    /// Files without chromaticities are assumed to be Rec. 709.
    pub fn new(read: R) -> Result<Self> {
        let inner = ScanlineReader::new(read)?;

        let header = inner.header();
        let chromaticities = header.chromaticities.unwrap_or(REC_709_CHROMATICITIES);
        let adopted_neutral = header.adopted_neutral;

        let conversion = if matches_aces(&chromaticities, adopted_neutral) { None }
            else { Some(file_to_aces_matrix(&chromaticities, adopted_neutral)?) };

        Ok(Self { inner, conversion })
    }

    /// The header of the image being read.
    pub fn header(&self) -> &Header { self.inner.header() }

    /// Whether the pixels need to be converted to ACES after decompression.
    /// If false, pixel values pass through exactly.
    pub fn needs_color_conversion(&self) -> bool {
        self.conversion.is_some()
    }

    /// Read all pixels of the data window, converting the
    /// `R`, `G` and `B` slices to ACES if required.
    pub fn read_all_pixels(&mut self, frame_buffer: &mut FrameBuffer) -> UnitResult {
        self.inner.read_all_pixels(frame_buffer)?;

        if let Some(conversion) = &self.conversion {
            let data_window = self.inner.header().data_window;

            let red_name = channel_name("R");
            let green_name = channel_name("G");
            let blue_name = channel_name("B");

            if frame_buffer.get(&red_name).is_none() {
                return Ok(()); // luminance/chroma contents pass through
            }

            for y in data_window.position.y()..data_window.end().y() {
                for x in data_window.position.x()..data_window.end().x() {
                    let rgb = Vec3(
                        f64::from(frame_buffer.expect(&red_name)?.get_f32(x, y)),
                        f64::from(frame_buffer.expect(&green_name)?.get_f32(x, y)),
                        f64::from(frame_buffer.expect(&blue_name)?.get_f32(x, y)),
                    );

                    let converted = conversion.transform(rgb);

                    frame_buffer.get_mut(&red_name).expect("slice presence checked above").set(x, y, converted.0 as f32);
                    frame_buffer.get_mut(&green_name).expect("slice presence checked above").set(x, y, converted.1 as f32);
                    frame_buffer.get_mut(&blue_name).expect("slice presence checked above").set(x, y, converted.2 as f32);
                }
            }
        }

        Ok(())
    }
}
