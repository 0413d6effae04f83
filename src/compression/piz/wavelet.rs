
//! The reversible 2D wavelet transform of the piz compression.
//! Uses the fast wavelet basis for 14-bit data, and the modulo
//! arithmetic basis for full 16-bit data.

use crate::math::Vec2;

pub fn encode(
    buffer: &mut [u16],                     // contains input and output
    Vec2(count_x, count_y): Vec2<usize>,    // number of samples in both dimensions
    Vec2(offset_x, offset_y): Vec2<usize>,  // index distance between samples in both dimensions
    max: u16,                               // maximum buffer value
) {
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);

    let mut p: usize = 1;
    let mut p2: usize = 2;

    // hierarchical loop on the smaller dimension
    while p2 <= count {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                // 2D wavelet encoding of the quad
                let (encoded_px, encoded_p10, encoded_p01, encoded_p11) = {
                    if is_14_bit {
                        let (i00, i01) = encode_14bit(buffer[position_x], buffer[p01]);
                        let (i10, i11) = encode_14bit(buffer[p10], buffer[p11]);

                        let (px, p10) = encode_14bit(i00, i10);
                        let (p01, p11) = encode_14bit(i01, i11);

                        (px, p10, p01, p11)
                    }
                    else {
                        let (i00, i01) = encode_16bit(buffer[position_x], buffer[p01]);
                        let (i10, i11) = encode_16bit(buffer[p10], buffer[p11]);

                        let (px, p10) = encode_16bit(i00, i10);
                        let (p01, p11) = encode_16bit(i01, i11);

                        (px, p10, p01, p11)
                    }
                };

                buffer[position_x] = encoded_px;
                buffer[p10] = encoded_p10;
                buffer[p01] = encoded_p01;
                buffer[p11] = encoded_p11;

                position_x += offset2_x;
            }

            // encode the remaining odd column, still in the y loop
            if count_x & p != 0 {
                let p10 = position_x + offset1_y;

                let (encoded_px, encoded_p10) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p10]) }
                    else { encode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = encoded_px;
                buffer[p10] = encoded_p10;
            }

            position_y += offset2_y;
        }

        // encode the remaining odd row, looping over x
        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_y + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (encoded_px, encoded_p01) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p01]) }
                    else { encode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[position_x] = encoded_px;
                buffer[p01] = encoded_p01;

                position_x += offset2_x;
            }
        }

        p = p2;
        p2 <<= 1;
    }
}


pub fn decode(
    buffer: &mut [u16],                     // contains input and output
    Vec2(count_x, count_y): Vec2<usize>,    // number of samples in both dimensions
    Vec2(offset_x, offset_y): Vec2<usize>,  // index distance between samples in both dimensions
    max: u16,                               // maximum buffer value
) {
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);

    // search the deepest level
    let mut p: usize = 1;
    let mut p2: usize;

    while p <= count {
        p <<= 1;
    }

    p >>= 1;
    p2 = p;
    p >>= 1;

    // hierarchical loop on the smaller dimension
    while p >= 1 {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                // 2D wavelet decoding of the quad
                let (decoded_px, decoded_p01, decoded_p10, decoded_p11) = {
                    if is_14_bit {
                        let (i00, i10) = decode_14bit(buffer[position_x], buffer[p10]);
                        let (i01, i11) = decode_14bit(buffer[p01], buffer[p11]);

                        let (px, p01) = decode_14bit(i00, i01);
                        let (p10, p11) = decode_14bit(i10, i11);

                        (px, p01, p10, p11)
                    }
                    else {
                        let (i00, i10) = decode_16bit(buffer[position_x], buffer[p10]);
                        let (i01, i11) = decode_16bit(buffer[p01], buffer[p11]);

                        let (px, p01) = decode_16bit(i00, i01);
                        let (p10, p11) = decode_16bit(i10, i11);

                        (px, p01, p10, p11)
                    }
                };

                buffer[position_x] = decoded_px;
                buffer[p01] = decoded_p01;
                buffer[p10] = decoded_p10;
                buffer[p11] = decoded_p11;

                position_x += offset2_x;
            }

            // decode the remaining odd column, still in the y loop
            if count_x & p != 0 {
                let p10 = position_x + offset1_y;

                let (decoded_px, decoded_p10) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p10]) }
                    else { decode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = decoded_px;
                buffer[p10] = decoded_p10;
            }

            position_y += offset2_y;
        }

        // decode the remaining odd row, looping over x
        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (decoded_px, decoded_p01) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p01]) }
                    else { decode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[position_x] = decoded_px;
                buffer[p01] = decoded_p01;

                position_x += offset2_x;
            }
        }

        p2 = p;
        p >>= 1;
    }
}


// The wavelet basis without modulo arithmetic produces the best
// compression ratios, but only works for 14-bit data.

#[inline]
fn encode_14bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i16, b as i16);

    let average = (a.wrapping_add(b)) >> 1;
    let difference = a.wrapping_sub(b);

    (average as u16, difference as u16)
}

#[inline]
fn decode_14bit(average: u16, difference: u16) -> (u16, u16) {
    let (average, difference) = (average as i16, difference as i16);

    let difference_wide = difference as i32;
    let a = average as i32 + (difference_wide & 1) + (difference_wide >> 1);

    let a = a as i16;
    let b = (a as i32 - difference_wide) as i16;

    (a as u16, b as u16)
}


// The wavelet basis with modulo arithmetic works with full
// 16-bit data, at a slightly worse compression ratio.

const BIT_COUNT: i32 = 16;
const OFFSET: i32 = 1 << (BIT_COUNT - 1);
const MOD_MASK: i32 = (1 << BIT_COUNT) - 1;

#[inline]
fn encode_16bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i32, b as i32);

    let a_offset = (a + OFFSET) & MOD_MASK;
    let mut average = (a_offset + b) >> 1;
    let difference = a_offset - b;

    if difference < 0 { average = (average + OFFSET) & MOD_MASK; }
    let difference = difference & MOD_MASK;

    (average as u16, difference as u16)
}

#[inline]
fn decode_16bit(average: u16, difference: u16) -> (u16, u16) {
    let (average, difference) = (average as i32, difference as i32);

    let b = (average - (difference >> 1)) & MOD_MASK;
    let a = (difference + b - OFFSET) & MOD_MASK;

    (a as u16, b as u16)
}


#[cfg(test)]
mod test {
    use crate::math::Vec2;

    #[test]
    fn roundtrip_14_bit_values() {
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16374, 16381), (16284, 3), (2, 1), (0, 0), (0, 4), (3, 0),
        ];

        for &values in &data {
            let (l, h) = super::encode_14bit(values.0, values.1);
            let result = super::decode_14bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_16_bit_values() {
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16385, 56384), (18384, 36384), (2, 1), (0, 0), (0, 4), (3, 0),
        ];

        for &values in &data {
            let (l, h) = super::encode_16bit(values.0, values.1);
            let result = super::decode_16bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_14bit_image() {
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16374, 16381, 16284, 3, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max);
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max);

        assert_eq!(data, transformed);
    }

    #[test]
    fn roundtrip_16bit_image() {
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16385, 56384, 18384, 36384, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max);
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max);

        assert_eq!(data, transformed);
    }

    #[test]
    fn roundtrip_odd_sizes() {
        for &(width, height) in &[(1_usize, 1_usize), (1, 7), (7, 1), (5, 3), (31, 17), (16, 16), (17, 33)] {
            let data: Vec<u16> = (0..width * height).map(|_| rand::random()).collect();
            let max = *data.iter().max().unwrap();

            let mut transformed = data.clone();
            super::encode(&mut transformed, Vec2(width, height), Vec2(1, width), max);
            super::decode(&mut transformed, Vec2(width, height), Vec2(1, width), max);

            assert_eq!(data, transformed);
        }
    }
}
