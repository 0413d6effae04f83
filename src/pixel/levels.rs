
//! Generation of mip map and rip map resolution levels
//! by separable downsampling filters.

use crate::error::{Error, Result};
use crate::frame::{FrameBuffer, Slice};
use crate::math::{compute_level_count, compute_level_size, RoundingMode, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds};


/// The downsampling filter used to compute each level from the previous one.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LevelFilter {

    /// The average of the 2x2 source block, or of the two
    /// remaining samples at the border.
    Box,

    /// A separable, normalized 1-2-1 kernel.
    Triangle,

    /// A separable lanczos kernel with two lobes.
    Lanczos,
}

/// How to generate the resolution levels of an image.
#[derive(Debug, Clone, Copy)]
pub struct LevelGeneration {

    /// The downsampling filter.
    pub filter: LevelFilter,

    /// Whether to round level sizes down or up.
    pub rounding_mode: RoundingMode,

    /// Replace negative filter outputs with zero.
    /// Useful for images that feed renderers which reject negative energy.
    pub clamp_negative: bool,
}


/// The weight of the lanczos kernel with two lobes at the specified position.
fn lanczos_2(position: f32) -> f32 {
    const LOBES: f32 = 2.0;

    let sinc = |x: f32| {
        if x.abs() < 1e-6 { 1.0 }
        else { (std::f32::consts::PI * x).sin() / (std::f32::consts::PI * x) }
    };

    if position.abs() >= LOBES { 0.0 }
    else { sinc(position) * sinc(position / LOBES) }
}

/// The sample offsets and weights of one filter tap pattern
/// for halving a dimension. Offsets are relative to the source
/// position of the output sample.
fn filter_taps(filter: LevelFilter) -> Vec<(i32, f32)> {
    match filter {
        LevelFilter::Box => vec![(0, 1.0), (1, 1.0)],
        LevelFilter::Triangle => vec![(-1, 1.0), (0, 2.0), (1, 1.0)],

        LevelFilter::Lanczos => (-3..=3)
            .map(|offset| (offset, lanczos_2(offset as f32 / 2.0)))
            .filter(|&(_, weight)| weight != 0.0)
            .collect(),
    }
}

/// Downsample one slice to the specified resolution,
/// first horizontally, then vertically.
fn downsample_slice(
    source: &Slice,
    source_bounds: IntegerBounds,
    target_bounds: IntegerBounds,
    generation: LevelGeneration,
) -> Slice {
    let taps = filter_taps(generation.filter);

    let filter_line = |samples: &dyn Fn(i32) -> f32, source_count: usize, target_position: i32| -> f32 {
        let source_position = target_position * 2;

        let mut sum = 0.0;
        let mut weight_sum = 0.0;

        for &(offset, weight) in &taps {
            let position = source_position + offset;

            if position >= 0 && (position as usize) < source_count {
                sum += weight * samples(position);
                weight_sum += weight;
            }
        }

        if weight_sum == 0.0 { 0.0 } else { sum / weight_sum }
    };

    // horizontal pass, at full source height
    let intermediate_width = target_bounds.width();
    let source_height = source_bounds.height();
    let mut intermediate = vec![0.0_f32; intermediate_width * source_height];

    for row in 0..source_height as i32 {
        let samples = |column: i32| source.get_f32(
            source_bounds.position.x() + column,
            source_bounds.position.y() + row,
        );

        for column in 0..intermediate_width as i32 {
            intermediate[row as usize * intermediate_width + column as usize] =
                filter_line(&samples, source_bounds.width(), column);
        }
    }

    // vertical pass
    let mut target = Slice::new(source.sample_type(), target_bounds);

    for column in 0..target_bounds.width() as i32 {
        let samples = |row: i32| intermediate[row as usize * intermediate_width + column as usize];

        for row in 0..target_bounds.height() as i32 {
            let mut value = filter_line(&samples, source_height, row);

            if generation.clamp_negative && value < 0.0 {
                value = 0.0;
            }

            target.set(
                target_bounds.position.x() + column,
                target_bounds.position.y() + row,
                value,
            );
        }
    }

    target
}

/// Downsample all channels of a frame buffer to the specified resolution.
fn downsample(
    channels: &ChannelList,
    source: &FrameBuffer,
    source_bounds: IntegerBounds,
    target_bounds: IntegerBounds,
    generation: LevelGeneration,
) -> Result<FrameBuffer> {
    let mut target = FrameBuffer::new();

    for channel in &channels.list {
        if channel.sampling != Vec2(1, 1) {
            return Err(Error::unsupported("resolution levels of subsampled channels"));
        }

        let slice = source.expect(&channel.name)?;
        target.insert(channel.name.clone(), downsample_slice(slice, source_bounds, target_bounds, generation));
    }

    Ok(target)
}

/// Generate all mip map levels of an image, including the full
/// resolution as level zero. Each level is computed from the previous one.
pub fn generate_mip_levels(
    channels: &ChannelList,
    full_resolution: &FrameBuffer,
    data_window: IntegerBounds,
    generation: LevelGeneration,
) -> Result<Vec<FrameBuffer>> {
    let size = data_window.size;
    let level_count = compute_level_count(generation.rounding_mode, size.width().max(size.height()));

    let mut levels = Vec::with_capacity(level_count);
    levels.push(full_resolution.clone());

    let mut previous_bounds = data_window;

    for level_index in 1..level_count {
        let level_bounds = IntegerBounds::new(data_window.position, Vec2(
            compute_level_size(generation.rounding_mode, size.width(), level_index),
            compute_level_size(generation.rounding_mode, size.height(), level_index),
        ));

        let level = downsample(
            channels, levels.last().expect("previous level was just pushed"),
            previous_bounds, level_bounds, generation
        )?;

        levels.push(level);
        previous_bounds = level_bounds;
    }

    Ok(levels)
}

/// Generate all rip map levels of an image. The returned levels are
/// indexed by their level index pair, with `(0, 0)` being the full
/// resolution. Each level is computed by downsampling the full
/// resolution the corresponding number of times per dimension.
pub fn generate_rip_levels(
    channels: &ChannelList,
    full_resolution: &FrameBuffer,
    data_window: IntegerBounds,
    generation: LevelGeneration,
) -> Result<Vec<(Vec2<usize>, FrameBuffer)>> {
    let size = data_window.size;
    let level_count_x = compute_level_count(generation.rounding_mode, size.width());
    let level_count_y = compute_level_count(generation.rounding_mode, size.height());

    // first build the horizontal level row at full height
    let mut horizontal_levels = Vec::with_capacity(level_count_x);
    horizontal_levels.push((data_window, full_resolution.clone()));

    for level_x in 1..level_count_x {
        let (previous_bounds, previous) = horizontal_levels.last().expect("level row is never empty");

        let level_bounds = IntegerBounds::new(data_window.position, Vec2(
            compute_level_size(generation.rounding_mode, size.width(), level_x),
            size.height(),
        ));

        // downsample horizontally only, by keeping the full height
        let mut level = FrameBuffer::new();
        for channel in &channels.list {
            let slice = previous.expect(&channel.name)?;
            level.insert(channel.name.clone(), downsample_horizontal_only(slice, *previous_bounds, level_bounds, generation));
        }

        horizontal_levels.push((level_bounds, level));
    }

    // then shrink each horizontal level vertically
    let mut levels = Vec::with_capacity(level_count_x * level_count_y);

    for (level_x, (bounds_x, level_at_full_height)) in horizontal_levels.into_iter().enumerate() {
        levels.push((Vec2(level_x, 0), level_at_full_height.clone()));

        let mut previous_bounds = bounds_x;
        let mut previous = level_at_full_height;

        for level_y in 1..level_count_y {
            let level_bounds = IntegerBounds::new(data_window.position, Vec2(
                bounds_x.width(),
                compute_level_size(generation.rounding_mode, size.height(), level_y),
            ));

            let mut level = FrameBuffer::new();
            for channel in &channels.list {
                let slice = previous.expect(&channel.name)?;
                level.insert(channel.name.clone(), downsample_vertical_only(slice, previous_bounds, level_bounds, generation));
            }

            levels.push((Vec2(level_x, level_y), level.clone()));
            previous_bounds = level_bounds;
            previous = level;
        }
    }

    Ok(levels)
}

fn downsample_horizontal_only(
    source: &Slice,
    source_bounds: IntegerBounds,
    target_bounds: IntegerBounds,
    generation: LevelGeneration,
) -> Slice {
    let taps = filter_taps(generation.filter);
    let mut target = Slice::new(source.sample_type(), target_bounds);

    for row in 0..target_bounds.height() as i32 {
        for column in 0..target_bounds.width() as i32 {
            let source_position = column * 2;

            let mut sum = 0.0;
            let mut weight_sum = 0.0;

            for &(offset, weight) in &taps {
                let position = source_position + offset;

                if position >= 0 && (position as usize) < source_bounds.width() {
                    sum += weight * source.get_f32(
                        source_bounds.position.x() + position,
                        source_bounds.position.y() + row,
                    );
                    weight_sum += weight;
                }
            }

            let mut value = if weight_sum == 0.0 { 0.0 } else { sum / weight_sum };
            if generation.clamp_negative && value < 0.0 { value = 0.0; }

            target.set(target_bounds.position.x() + column, target_bounds.position.y() + row, value);
        }
    }

    target
}

fn downsample_vertical_only(
    source: &Slice,
    source_bounds: IntegerBounds,
    target_bounds: IntegerBounds,
    generation: LevelGeneration,
) -> Slice {
    let taps = filter_taps(generation.filter);
    let mut target = Slice::new(source.sample_type(), target_bounds);

    for column in 0..target_bounds.width() as i32 {
        for row in 0..target_bounds.height() as i32 {
            let source_position = row * 2;

            let mut sum = 0.0;
            let mut weight_sum = 0.0;

            for &(offset, weight) in &taps {
                let position = source_position + offset;

                if position >= 0 && (position as usize) < source_bounds.height() {
                    sum += weight * source.get_f32(
                        source_bounds.position.x() + column,
                        source_bounds.position.y() + position,
                    );
                    weight_sum += weight;
                }
            }

            let mut value = if weight_sum == 0.0 { 0.0 } else { sum / weight_sum };
            if generation.clamp_negative && value < 0.0 { value = 0.0; }

            target.set(target_bounds.position.x() + column, target_bounds.position.y() + row, value);
        }
    }

    target
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, SampleType, Text};

    fn single_channel(data_window: IntegerBounds, value: impl Fn(i32, i32) -> f32) -> (ChannelList, FrameBuffer) {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("G").unwrap(), SampleType::F32, false),
        ]);

        let mut frame_buffer = FrameBuffer::alloc(&channels, data_window);
        let green = Text::new("G").unwrap();

        for y in data_window.position.y()..data_window.end().y() {
            for x in data_window.position.x()..data_window.end().x() {
                frame_buffer.get_mut(&green).unwrap().set(x, y, value(x, y));
            }
        }

        (channels, frame_buffer)
    }

    #[test]
    fn constant_image_stays_constant_at_all_levels() {
        let data_window = IntegerBounds::from_dimensions(Vec2(32, 32));
        let (channels, frame_buffer) = single_channel(data_window, |_, _| 0.5);

        for &filter in &[LevelFilter::Box, LevelFilter::Triangle, LevelFilter::Lanczos] {
            let levels = generate_mip_levels(&channels, &frame_buffer, data_window, LevelGeneration {
                filter,
                rounding_mode: RoundingMode::Down,
                clamp_negative: false,
            }).unwrap();

            assert_eq!(levels.len(), 6);

            let deepest = levels.last().unwrap();
            let value = deepest.get(&Text::new("G").unwrap()).unwrap().get_f32(0, 0);
            assert!((value - 0.5).abs() < 1e-5, "{:?}: {}", filter, value);
        }
    }

    #[test]
    fn box_filter_averages_quads() {
        let data_window = IntegerBounds::from_dimensions(Vec2(4, 4));
        let (channels, frame_buffer) = single_channel(data_window, |x, _| x as f32);

        let levels = generate_mip_levels(&channels, &frame_buffer, data_window, LevelGeneration {
            filter: LevelFilter::Box,
            rounding_mode: RoundingMode::Down,
            clamp_negative: false,
        }).unwrap();

        // columns 0,1 average to 0.5 and columns 2,3 to 2.5
        let half = &levels[1];
        assert_eq!(half.get(&Text::new("G").unwrap()).unwrap().get_f32(0, 0), 0.5);
        assert_eq!(half.get(&Text::new("G").unwrap()).unwrap().get_f32(1, 0), 2.5);
    }

    #[test]
    fn clamp_negative_zeroes_dark_rings() {
        let data_window = IntegerBounds::from_dimensions(Vec2(8, 8));
        let (channels, frame_buffer) = single_channel(data_window, |x, _| {
            if x == 4 { 100.0 } else { -1.0 }
        });

        let levels = generate_mip_levels(&channels, &frame_buffer, data_window, LevelGeneration {
            filter: LevelFilter::Lanczos,
            rounding_mode: RoundingMode::Down,
            clamp_negative: true,
        }).unwrap();

        for level in &levels[1..] {
            let slice = level.get(&Text::new("G").unwrap()).unwrap();
            let bounds = slice.bounds();

            for y in bounds.position.y()..bounds.end().y() {
                for x in bounds.position.x()..bounds.end().x() {
                    assert!(slice.get_f32(x, y) >= 0.0);
                }
            }
        }
    }

    #[test]
    fn rip_levels_cover_all_combinations() {
        let data_window = IntegerBounds::from_dimensions(Vec2(8, 4));
        let (channels, frame_buffer) = single_channel(data_window, |x, y| (x + y) as f32);

        let levels = generate_rip_levels(&channels, &frame_buffer, data_window, LevelGeneration {
            filter: LevelFilter::Box,
            rounding_mode: RoundingMode::Down,
            clamp_negative: false,
        }).unwrap();

        // 4 horizontal levels times 3 vertical levels
        assert_eq!(levels.len(), 4 * 3);

        let (level_index, smallest) = levels.last().unwrap();
        assert_eq!(*level_index, Vec2(3, 2));

        let bounds = smallest.get(&Text::new("G").unwrap()).unwrap().bounds();
        assert_eq!(bounds.size, Vec2(1, 1));
    }
}
