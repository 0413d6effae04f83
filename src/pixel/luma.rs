
//! Luminance/chroma encoding of rgb pixels, with 2x2 subsampled
//! chroma channels. Shrinks rgb images to about half their size
//! at slight visual cost.

use crate::error::{Result, UnitResult};
use crate::frame::{FrameBuffer, Slice};
use crate::math::Vec2;
use crate::meta::attribute::{ChannelDescription, ChannelList, IntegerBounds, SampleType, Text};

/// The BT.709 luminance weight of the red channel.
pub const KR: f32 = 0.2126;

/// The BT.709 luminance weight of the green channel.
pub const KG: f32 = 0.7152;

/// The BT.709 luminance weight of the blue channel.
pub const KB: f32 = 0.0722;


fn name(text: &str) -> Text {
    Text::new(text).expect("channel name is valid ascii")
}

/// The channel list of a luminance/chroma image: full resolution `Y`,
/// and `RY`/`BY` sampled every second pixel in both dimensions.
pub fn yc_channels(sample_type: SampleType) -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription {
            name: name("BY"),
            sample_type,
            quantize_linearly: true,
            sampling: Vec2(2, 2),
        },
        ChannelDescription {
            name: name("RY"),
            sample_type,
            quantize_linearly: true,
            sampling: Vec2(2, 2),
        },
        ChannelDescription::new(name("Y"), sample_type, false),
    ])
}

/// Whether the channel list looks like a luminance/chroma image.
pub fn is_yc_channel_list(channels: &ChannelList) -> bool {
    channels.find(&name("Y")).is_some()
        && channels.find(&name("RY")).map_or(false, |channel| channel.sampling == Vec2(2, 2))
        && channels.find(&name("BY")).map_or(false, |channel| channel.sampling == Vec2(2, 2))
}

/// Convert full resolution rgb pixels into a luminance/chroma frame buffer:
/// the luminance of every pixel, and the chroma of every 2x2 pixel block,
/// box-averaged from the full resolution chroma.
pub fn rgb_to_yc(rgb: &FrameBuffer, data_window: IntegerBounds, sample_type: SampleType) -> Result<FrameBuffer> {
    let red = rgb.expect(&name("R"))?;
    let green = rgb.expect(&name("G"))?;
    let blue = rgb.expect(&name("B"))?;

    let mut luminance = Slice::new(sample_type, data_window);
    let mut chroma_red = Slice::with_sampling(sample_type, data_window, Vec2(2, 2));
    let mut chroma_blue = Slice::with_sampling(sample_type, data_window, Vec2(2, 2));

    let full_chroma = |x: i32, y: i32| -> (f32, f32) {
        let r = red.get_f32(x, y);
        let g = green.get_f32(x, y);
        let b = blue.get_f32(x, y);

        let y_value = KR * r + KG * g + KB * b;
        (r - y_value, b - y_value)
    };

    for y in data_window.position.y()..data_window.end().y() {
        for x in data_window.position.x()..data_window.end().x() {
            let r = red.get_f32(x, y);
            let g = green.get_f32(x, y);
            let b = blue.get_f32(x, y);

            luminance.set(x, y, KR * r + KG * g + KB * b);
        }
    }

    // box-average the full resolution chroma of every 2x2 block
    for y in (data_window.position.y()..data_window.end().y()).step_by(2) {
        for x in (data_window.position.x()..data_window.end().x()).step_by(2) {
            let mut sum_ry = 0.0;
            let mut sum_by = 0.0;
            let mut weight = 0.0;

            for offset_y in 0..2 {
                for offset_x in 0..2 {
                    let sample_x = x + offset_x;
                    let sample_y = y + offset_y;

                    if sample_x < data_window.end().x() && sample_y < data_window.end().y() {
                        let (ry, by) = full_chroma(sample_x, sample_y);
                        sum_ry += ry;
                        sum_by += by;
                        weight += 1.0;
                    }
                }
            }

            chroma_red.set(x, y, sum_ry / weight);
            chroma_blue.set(x, y, sum_by / weight);
        }
    }

    let mut yc = FrameBuffer::new();
    yc.insert(name("Y"), luminance);
    yc.insert(name("RY"), chroma_red);
    yc.insert(name("BY"), chroma_blue);
    Ok(yc)
}

/// Bilinearly sample a subsampled chroma slice at the full resolution
/// pixel position: pixel `(x, y)` samples chroma at `(x/2, y/2)`,
/// clamping at the edges.
fn reconstruct_chroma(slice: &Slice, x: i32, y: i32, data_window: IntegerBounds) -> f32 {
    let clamp_x = |x: i32| x.max(data_window.position.x()).min(data_window.max().x());
    let clamp_y = |y: i32| y.max(data_window.position.y()).min(data_window.max().y());

    // even pixels lie exactly on a chroma sample, odd pixels halfway between two
    let sample = |x: i32, y: i32| slice.get_f32(clamp_x(x), clamp_y(y));

    let x_aligned = x & !1;
    let y_aligned = y & !1;

    let x_odd = x & 1 != 0;
    let y_odd = y & 1 != 0;

    match (x_odd, y_odd) {
        (false, false) => sample(x_aligned, y_aligned),

        (true, false) => 0.5 * (sample(x_aligned, y_aligned) + sample(x_aligned + 2, y_aligned)),

        (false, true) => 0.5 * (sample(x_aligned, y_aligned) + sample(x_aligned, y_aligned + 2)),

        (true, true) => 0.25 * (
            sample(x_aligned, y_aligned) + sample(x_aligned + 2, y_aligned)
            + sample(x_aligned, y_aligned + 2) + sample(x_aligned + 2, y_aligned + 2)
        ),
    }
}

/// Reconstruct full resolution rgb pixels from a luminance/chroma frame
/// buffer, writing into the `R`, `G` and `B` slices of the target.
pub fn yc_to_rgb(yc: &FrameBuffer, rgb: &mut FrameBuffer, data_window: IntegerBounds) -> UnitResult {
    let luminance = yc.expect(&name("Y"))?;
    let chroma_red = yc.expect(&name("RY"))?;
    let chroma_blue = yc.expect(&name("BY"))?;

    rgb.expect(&name("R"))?;
    rgb.expect(&name("G"))?;
    rgb.expect(&name("B"))?;

    for y in data_window.position.y()..data_window.end().y() {
        for x in data_window.position.x()..data_window.end().x() {
            let y_value = luminance.get_f32(x, y);
            let ry = reconstruct_chroma(chroma_red, x, y, data_window);
            let by = reconstruct_chroma(chroma_blue, x, y, data_window);

            let r = ry + y_value;
            let b = by + y_value;
            let g = (y_value - KR * r - KB * b) / KG;

            rgb.get_mut(&name("R")).expect("slice presence checked above").set(x, y, r);
            rgb.get_mut(&name("G")).expect("slice presence checked above").set(x, y, g);
            rgb.get_mut(&name("B")).expect("slice presence checked above").set(x, y, b);
        }
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::FrameBuffer;

    fn rgb_buffer(data_window: IntegerBounds, pixel: impl Fn(i32, i32) -> (f32, f32, f32)) -> FrameBuffer {
        let mut rgb = FrameBuffer::new();
        rgb.insert(name("R"), Slice::new(SampleType::F32, data_window));
        rgb.insert(name("G"), Slice::new(SampleType::F32, data_window));
        rgb.insert(name("B"), Slice::new(SampleType::F32, data_window));

        for y in data_window.position.y()..data_window.end().y() {
            for x in data_window.position.x()..data_window.end().x() {
                let (r, g, b) = pixel(x, y);
                rgb.get_mut(&name("R")).unwrap().set(x, y, r);
                rgb.get_mut(&name("G")).unwrap().set(x, y, g);
                rgb.get_mut(&name("B")).unwrap().set(x, y, b);
            }
        }

        rgb
    }

    #[test]
    fn luminance_weights_sum_to_one() {
        assert!((KR + KG + KB - 1.0).abs() < 1e-6);
    }

    #[test]
    fn grayscale_stays_grayscale() {
        let data_window = IntegerBounds::from_dimensions(Vec2(16, 16));
        let rgb = rgb_buffer(data_window, |x, _| {
            let gray = x as f32 / 16.0;
            (gray, gray, gray)
        });

        let yc = rgb_to_yc(&rgb, data_window, SampleType::F32).unwrap();

        // grayscale means zero chroma
        for y in (0..16).step_by(2) {
            for x in (0..16).step_by(2) {
                assert!(yc.get(&name("RY")).unwrap().get_f32(x, y).abs() < 1e-5);
                assert!(yc.get(&name("BY")).unwrap().get_f32(x, y).abs() < 1e-5);
            }
        }

        let mut reconstructed = rgb_buffer(data_window, |_, _| (0.0, 0.0, 0.0));
        yc_to_rgb(&yc, &mut reconstructed, data_window).unwrap();

        for y in 0..16 {
            for x in 0..16 {
                let original = rgb.get(&name("G")).unwrap().get_f32(x, y);

                for channel in ["R", "G", "B"] {
                    let value = reconstructed.get(&name(channel)).unwrap().get_f32(x, y);
                    assert!((value - original).abs() < 0.01, "{} at {},{}: {} vs {}", channel, x, y, value, original);
                }
            }
        }
    }

    #[test]
    fn smooth_colors_roundtrip_closely() {
        let data_window = IntegerBounds::from_dimensions(Vec2(32, 32));
        let rgb = rgb_buffer(data_window, |x, y| (
            x as f32 / 32.0,
            y as f32 / 32.0,
            (x + y) as f32 / 64.0,
        ));

        let yc = rgb_to_yc(&rgb, data_window, SampleType::F32).unwrap();

        let mut reconstructed = rgb_buffer(data_window, |_, _| (0.0, 0.0, 0.0));
        yc_to_rgb(&yc, &mut reconstructed, data_window).unwrap();

        let mut total_error = 0.0;
        let mut sample_count = 0;

        for y in 0..32 {
            for x in 0..32 {
                for channel in ["R", "G", "B"] {
                    let original = rgb.get(&name(channel)).unwrap().get_f32(x, y);
                    let lossy = reconstructed.get(&name(channel)).unwrap().get_f32(x, y);
                    total_error += (original - lossy).abs();
                    sample_count += 1;
                }
            }
        }

        let mean_error = total_error / sample_count as f32;
        assert!(mean_error < 0.05, "mean error {}", mean_error);
    }

    #[test]
    fn yc_channel_list_is_detected() {
        assert!(is_yc_channel_list(&yc_channels(SampleType::F16)));

        let rgb = ChannelList::new(smallvec![
            ChannelDescription::new(name("R"), SampleType::F16, false),
        ]);

        assert!(!is_yc_channel_list(&rgb));
    }
}
