
//! 16-bit huffman compression and decompression.
//! The canonical code table is transmitted as packed 6-bit code lengths,
//! and one pseudo symbol marks run-length repetitions of the previous value.

use std::collections::BinaryHeap;
use std::cmp::Reverse;

use crate::error::{Error, Result};
use crate::io::Data;

const ENCODE_BITS: usize = 16;                      // literal (value) bit length
const DECODE_BITS: usize = 14;                      // decoding bit size (>= 8)

const ENCODING_TABLE_SIZE: usize = (1 << ENCODE_BITS) + 1; // including the run-length pseudo symbol
const DECODING_TABLE_SIZE: usize = 1 << DECODE_BITS;
const DECODE_MASK: u64 = DECODING_TABLE_SIZE as u64 - 1;

// code length table zero-run codes
const SHORT_ZEROCODE_RUN: u64 = 59;
const LONG_ZEROCODE_RUN: u64 = 63;
const SHORTEST_LONG_RUN: u64 = 2 + LONG_ZEROCODE_RUN - SHORT_ZEROCODE_RUN;
const LONGEST_LONG_RUN: u64 = 255 + SHORTEST_LONG_RUN;

/// A code table entry packs the code bits and the code length into one value.
#[inline] fn length(code: u64) -> u64 { code & 63 }
#[inline] fn code(code: u64) -> u64 { code >> 6 }


/// Compress the values into a self-contained huffman block:
/// a 20 byte header, the packed code length table, and the coded bits.
pub fn compress(uncompressed: &[u16]) -> Result<Vec<u8>> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let mut frequencies = count_frequencies(uncompressed);
    let (min_index, max_index) = build_encoding_table(&mut frequencies);

    let table_bytes = pack_encoding_table(&frequencies, min_index, max_index)?;
    let (data_bytes, bit_count) = encode_symbols(uncompressed, &frequencies, max_index)?;

    let mut compressed = Vec::with_capacity(20 + table_bytes.len() + data_bytes.len());
    (min_index as u32).write(&mut compressed)?;
    (max_index as u32).write(&mut compressed)?;
    (table_bytes.len() as u32).write(&mut compressed)?;
    (bit_count as u32).write(&mut compressed)?;
    0_u32.write(&mut compressed)?; // reserved for future extensions

    compressed.extend_from_slice(&table_bytes);
    compressed.extend_from_slice(&data_bytes);

    Ok(compressed)
}

/// Decompress a huffman block into the expected number of values.
pub fn decompress(compressed: &[u8], expected_value_count: usize) -> Result<Vec<u16>> {
    if expected_value_count == 0 {
        return Ok(Vec::new());
    }

    let mut remaining = compressed;
    let min_index = u32::read(&mut remaining)? as usize;
    let max_index = u32::read(&mut remaining)? as usize;
    let _table_byte_count = u32::read(&mut remaining)? as usize;
    let bit_count = u32::read(&mut remaining)? as usize;
    let _reserved = u32::read(&mut remaining)?;

    if min_index >= ENCODING_TABLE_SIZE || max_index >= ENCODING_TABLE_SIZE || min_index > max_index {
        return Err(Error::decompression("huffman table range"));
    }

    let codes = unpack_encoding_table(&mut remaining, min_index, max_index)?;

    if bit_count > 8 * remaining.len() {
        return Err(Error::decompression("huffman bit count"));
    }

    let decoding_table = build_decoding_table(&codes, min_index, max_index)?;

    decode_symbols(
        &codes, &decoding_table, remaining,
        bit_count, max_index, expected_value_count
    )
}


fn count_frequencies(data: &[u16]) -> Vec<u64> {
    let mut frequencies = vec![0_u64; ENCODING_TABLE_SIZE];

    for &value in data {
        frequencies[value as usize] += 1;
    }

    frequencies
}


/// Append bits to the accumulator, flushing complete bytes.
#[inline]
fn write_bits(count: u64, bits: u64, c: &mut u128, lc: &mut u64, out: &mut Vec<u8>) {
    *c = (*c << count) | u128::from(bits);
    *lc += count;

    while *lc >= 8 {
        *lc -= 8;
        out.push((*c >> *lc) as u8);
    }
}

#[inline]
fn write_code(scode: u64, c: &mut u128, lc: &mut u64, out: &mut Vec<u8>) {
    write_bits(length(scode), code(scode), c, lc, out);
}

/// Take bits from the accumulator, pulling in bytes as needed.
#[inline]
fn read_bits(count: u64, c: &mut u128, lc: &mut i64, input: &mut &[u8]) -> Result<u64> {
    while (*lc as u64) < count {
        let byte = *input.first().ok_or_else(|| Error::decompression("huffman data truncated"))?;
        *input = &input[1..];

        *c = (*c << 8) | u128::from(byte);
        *lc += 8;
    }

    *lc -= count as i64;
    Ok(((*c >> *lc) & ((1_u128 << count) - 1)) as u64)
}


/// Build a canonical code table from the code lengths:
/// shorter codes, filled with zeroes to the right, have numerically
/// higher values than longer codes, and codes of the same length
/// increase with their symbol value. The table can therefore be
/// transmitted as lengths alone.
fn canonical_code_table(code_lengths: &mut [u64]) {
    debug_assert_eq!(code_lengths.len(), ENCODING_TABLE_SIZE);

    // count the codes of each length
    let mut count_per_length = [0_u64; 59];
    for &length in code_lengths.iter() {
        count_per_length[length as usize] += 1;
    }

    // compute the numerically lowest code of each length
    let mut next_code = 0_u64;
    for length in (1..=58_usize).rev() {
        let code = (next_code + count_per_length[length]) >> 1;
        count_per_length[length] = next_code;
        next_code = code;
    }

    // assign the next available code of each symbol's length
    for entry in code_lengths.iter_mut() {
        let length = *entry;
        if length > 0 {
            *entry = length | (count_per_length[length as usize] << 6);
            count_per_length[length as usize] += 1;
        }
    }
}

/// Compute the code length of every symbol from the frequencies, replacing the
/// frequencies with the canonical `(code, length)` table. Appends one pseudo
/// symbol used for run-length coding, and returns the index range of the
/// symbols that occur in the data.
fn build_encoding_table(frequencies: &mut [u64]) -> (usize, usize) {
    debug_assert_eq!(frequencies.len(), ENCODING_TABLE_SIZE);

    // the symbols with non-zero frequencies, as a min-heap
    // ordered by frequency and then by symbol
    let mut heap = BinaryHeap::with_capacity(1024);

    let mut min_index = 0;
    let mut max_index = 0;
    let mut found_any = false;

    for (symbol, &frequency) in frequencies.iter().enumerate() {
        if frequency != 0 {
            if !found_any {
                min_index = symbol;
                found_any = true;
            }

            max_index = symbol;
            heap.push(Reverse((frequency, symbol)));
        }
    }

    // add the run-length pseudo symbol just after the last real symbol
    max_index += 1;
    frequencies[max_index] = 1;
    heap.push(Reverse((1, max_index)));

    // conceptually this builds the huffman tree; instead of the tree itself,
    // only the leaf depths are tracked: the symbols of each merged subtree
    // form a linked list, and every merge increments the code length
    // of all symbols in both lists
    let mut code_lengths = vec![0_u64; ENCODING_TABLE_SIZE];
    let mut merged_lists = vec![0_usize; ENCODING_TABLE_SIZE];

    for index in 0..ENCODING_TABLE_SIZE {
        merged_lists[index] = index; // hlink[i] == i marks the end of a list
    }

    while heap.len() > 1 {
        let Reverse((smallest_frequency, smallest)) = heap.pop().expect("heap size checked above");
        let Reverse((second_frequency, second)) = heap.pop().expect("heap size checked above");

        heap.push(Reverse((smallest_frequency + second_frequency, second)));

        // add a bit to all codes in the first list, then merge in the second list
        let mut symbol = second;
        loop {
            code_lengths[symbol] += 1;
            debug_assert!(code_lengths[symbol] <= 58, "huffman code length overflow");

            if merged_lists[symbol] == symbol {
                merged_lists[symbol] = smallest;
                break;
            }

            symbol = merged_lists[symbol];
        }

        // add a bit to all codes in the second list
        let mut symbol = smallest;
        loop {
            code_lengths[symbol] += 1;
            debug_assert!(code_lengths[symbol] <= 58, "huffman code length overflow");

            if merged_lists[symbol] == symbol {
                break;
            }

            symbol = merged_lists[symbol];
        }
    }

    canonical_code_table(&mut code_lengths);
    frequencies.copy_from_slice(&code_lengths);

    (min_index, max_index)
}


/// Pack the code lengths of the range into 6-bit fields,
/// with zero runs shortened to run codes.
fn pack_encoding_table(codes: &[u64], min_index: usize, max_index: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((max_index - min_index) / 2);
    let mut c = 0_u128;
    let mut lc = 0_u64;

    let mut index = min_index;
    while index <= max_index {
        let code_length = length(codes[index]);

        if code_length == 0 {
            let mut zero_run = 1_u64;

            while index < max_index && zero_run < LONGEST_LONG_RUN {
                if length(codes[index + 1]) > 0 { break; }
                index += 1;
                zero_run += 1;
            }

            if zero_run >= 2 {
                if zero_run >= SHORTEST_LONG_RUN {
                    write_bits(6, LONG_ZEROCODE_RUN, &mut c, &mut lc, &mut out);
                    write_bits(8, zero_run - SHORTEST_LONG_RUN, &mut c, &mut lc, &mut out);
                }
                else {
                    write_bits(6, SHORT_ZEROCODE_RUN + zero_run - 2, &mut c, &mut lc, &mut out);
                }

                index += 1;
                continue;
            }
        }

        write_bits(6, code_length, &mut c, &mut lc, &mut out);
        index += 1;
    }

    if lc > 0 {
        out.push((c << (8 - lc)) as u8);
    }

    Ok(out)
}

/// Read the packed code lengths of the range and
/// rebuild the canonical code table from them.
fn unpack_encoding_table(read: &mut &[u8], min_index: usize, max_index: usize) -> Result<Vec<u64>> {
    let mut codes = vec![0_u64; ENCODING_TABLE_SIZE];
    let mut c = 0_u128;
    let mut lc = 0_i64;

    let mut index = min_index;
    while index <= max_index {
        let code_length = read_bits(6, &mut c, &mut lc, read)?;
        codes[index] = code_length;

        if code_length == LONG_ZEROCODE_RUN {
            let zero_run = read_bits(8, &mut c, &mut lc, read)? + SHORTEST_LONG_RUN;

            if index as u64 + zero_run > max_index as u64 + 1 {
                return Err(Error::decompression("huffman table zero run"));
            }

            for _ in 0..zero_run {
                codes[index] = 0;
                index += 1;
            }
        }
        else if code_length >= SHORT_ZEROCODE_RUN {
            let zero_run = code_length - SHORT_ZEROCODE_RUN + 2;

            if index as u64 + zero_run > max_index as u64 + 1 {
                return Err(Error::decompression("huffman table zero run"));
            }

            for _ in 0..zero_run {
                codes[index] = 0;
                index += 1;
            }
        }
        else {
            index += 1;
        }
    }

    canonical_code_table(&mut codes);
    Ok(codes)
}


/// One entry of the decoding table: either a single short code,
/// or the list of symbols whose long codes share the table index.
#[derive(Clone, Default)]
struct Decode {
    len: u8,             // the code length of a short code, or zero
    lit: u32,            // the symbol of a short code
    long: Vec<u32>,      // the symbols of all long codes with this prefix
}

/// Build the lookup table indexed by the next `DECODE_BITS` input bits.
fn build_decoding_table(codes: &[u64], min_index: usize, max_index: usize) -> Result<Vec<Decode>> {
    let mut table = vec![Decode::default(); DECODING_TABLE_SIZE];

    for symbol in min_index..=max_index {
        let entry_code = code(codes[symbol]);
        let entry_length = length(codes[symbol]);

        if entry_code >> entry_length != 0 {
            return Err(Error::decompression("huffman table entry"));
        }

        if entry_length > DECODE_BITS as u64 {
            // a long code: store the symbol in the list of its prefix
            let entry = &mut table[(entry_code >> (entry_length - DECODE_BITS as u64)) as usize];

            if entry.len != 0 {
                return Err(Error::decompression("huffman table entry"));
            }

            entry.long.push(symbol as u32);
        }
        else if entry_length > 0 {
            // a short code: fill all table entries that start with this code
            let start = (entry_code << (DECODE_BITS as u64 - entry_length)) as usize;
            let count = 1_usize << (DECODE_BITS as u64 - entry_length);

            for entry in &mut table[start .. start + count] {
                if entry.len != 0 || !entry.long.is_empty() {
                    return Err(Error::decompression("huffman table entry"));
                }

                entry.len = entry_length as u8;
                entry.lit = symbol as u32;
            }
        }
    }

    Ok(table)
}


/// Emit the code of one symbol, shortening runs of repetitions
/// with the run-length pseudo symbol where that is smaller.
#[inline]
fn send_code(symbol_code: u64, run_count: u64, run_code: u64, c: &mut u128, lc: &mut u64, out: &mut Vec<u8>) {
    if length(symbol_code) + length(run_code) + 8 < length(symbol_code) * run_count {
        write_code(symbol_code, c, lc, out);
        write_code(run_code, c, lc, out);
        write_bits(8, run_count, c, lc, out);
    }
    else {
        for _ in 0..=run_count {
            write_code(symbol_code, c, lc, out);
        }
    }
}

/// Encode all values, returning the coded bytes and the total number of bits.
fn encode_symbols(data: &[u16], codes: &[u64], run_length_code: usize) -> Result<(Vec<u8>, u64)> {
    let mut out = Vec::with_capacity(data.len());
    let mut c = 0_u128;
    let mut lc = 0_u64;

    let mut current = data[0];
    let mut run_count = 0_u64;

    for &value in &data[1..] {
        if value == current && run_count < 255 {
            run_count += 1;
        }
        else {
            send_code(codes[current as usize], run_count, codes[run_length_code], &mut c, &mut lc, &mut out);
            current = value;
            run_count = 0;
        }
    }

    send_code(codes[current as usize], run_count, codes[run_length_code], &mut c, &mut lc, &mut out);

    let bit_count = out.len() as u64 * 8 + lc;

    if lc > 0 {
        out.push((c << (8 - lc)) as u8);
    }

    Ok((out, bit_count))
}

/// Store one decoded symbol, expanding run-length repetitions.
#[inline]
fn push_decoded(
    symbol: u32,
    run_length_code: usize,
    c: &mut u128, lc: &mut i64,
    input: &mut &[u8],
    out: &mut Vec<u16>,
    expected_value_count: usize,
) -> crate::error::UnitResult {
    if symbol as usize == run_length_code {
        // the next eight bits hold the repetition count of the previous value
        if *lc < 8 {
            let byte = *input.first().ok_or_else(|| Error::decompression("huffman data truncated"))?;
            *input = &input[1..];
            *c = (*c << 8) | u128::from(byte);
            *lc += 8;
        }

        *lc -= 8;
        let run = ((*c >> *lc) & 0xff) as usize;

        if out.len() + run > expected_value_count {
            return Err(Error::decompression("huffman run exceeds the chunk"));
        }

        let repeated = *out.last().ok_or_else(|| Error::decompression("huffman run without a value"))?;
        out.resize(out.len() + run, repeated);
    }
    else {
        if out.len() >= expected_value_count {
            return Err(Error::decompression("huffman data exceeds the chunk"));
        }

        out.push(symbol as u16);
    }

    Ok(())
}

/// Decode the coded bits back into values.
fn decode_symbols(
    codes: &[u64],
    table: &[Decode],
    input: &[u8],
    bit_count: usize,
    run_length_code: usize,
    expected_value_count: usize,
) -> Result<Vec<u16>> {
    let mut out = Vec::with_capacity(expected_value_count);
    let mut c = 0_u128;
    let mut lc = 0_i64;

    let input_byte_count = (bit_count + 7) / 8;
    if input_byte_count > input.len() {
        return Err(Error::decompression("huffman data truncated"));
    }

    let mut remaining = &input[..input_byte_count];

    while let Some((&byte, rest)) = remaining.split_first() {
        remaining = rest;
        c = (c << 8) | u128::from(byte);
        lc += 8;

        while lc >= DECODE_BITS as i64 {
            let index = ((c >> (lc - DECODE_BITS as i64)) & u128::from(DECODE_MASK)) as usize;
            let entry = &table[index];

            if entry.len != 0 {
                // a short code, directly resolved by the table
                lc -= i64::from(entry.len);
                push_decoded(entry.lit, run_length_code, &mut c, &mut lc, &mut remaining, &mut out, expected_value_count)?;
            }
            else {
                // a long code, resolved by searching the candidates of its prefix
                if entry.long.is_empty() {
                    return Err(Error::decompression("invalid huffman code"));
                }

                let mut resolved = false;

                for &symbol in &entry.long {
                    let symbol_length = length(codes[symbol as usize]) as i64;

                    while lc < symbol_length {
                        match remaining.split_first() {
                            Some((&byte, rest)) => {
                                remaining = rest;
                                c = (c << 8) | u128::from(byte);
                                lc += 8;
                            },
                            None => break,
                        }
                    }

                    if lc >= symbol_length {
                        let candidate = ((c >> (lc - symbol_length)) & ((1_u128 << symbol_length) - 1)) as u64;

                        if code(codes[symbol as usize]) == candidate {
                            lc -= symbol_length;
                            push_decoded(symbol, run_length_code, &mut c, &mut lc, &mut remaining, &mut out, expected_value_count)?;
                            resolved = true;
                            break;
                        }
                    }
                }

                if !resolved {
                    return Err(Error::decompression("invalid huffman code"));
                }
            }
        }
    }

    // consume the padding bits of the last byte, then drain the leftover bits
    let padding = (8 - bit_count as i64) & 7;
    c >>= padding;
    lc -= padding;

    while lc > 0 {
        let index = ((c << (DECODE_BITS as i64 - lc)) & u128::from(DECODE_MASK)) as usize;
        let entry = &table[index];

        if entry.len != 0 {
            lc -= i64::from(entry.len);
            push_decoded(entry.lit, run_length_code, &mut c, &mut lc, &mut remaining, &mut out, expected_value_count)?;
        }
        else {
            return Err(Error::decompression("invalid huffman code"));
        }
    }

    if out.len() != expected_value_count {
        return Err(Error::decompression("huffman data ends before the chunk"));
    }

    Ok(out)
}


#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(data: &[u16]) {
        let compressed = compress(data).unwrap();
        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(data, decompressed.as_slice());
    }

    #[test]
    fn roundtrip_single_value() {
        roundtrip(&[0]);
        roundtrip(&[12345]);
        roundtrip(&[65535]);
    }

    #[test]
    fn roundtrip_repetitions() {
        roundtrip(&[7; 300]);
        roundtrip(&[0; 100_000]);

        let mut data = vec![9_u16; 1000];
        data.extend_from_slice(&[1, 2, 3, 4, 5]);
        data.extend(std::iter::repeat(9).take(1000));
        roundtrip(&data);
    }

    #[test]
    fn roundtrip_two_symbols() {
        let data: Vec<u16> = (0..4096).map(|index| if index % 3 == 0 { 100 } else { 200 }).collect();
        roundtrip(&data);
    }

    #[test]
    fn roundtrip_wide_alphabet() {
        let data: Vec<u16> = (0..=65535).collect();
        roundtrip(&data);
    }

    #[test]
    fn roundtrip_noise() {
        for length in [1_usize, 2, 3, 100, 1023, 70_000] {
            let data: Vec<u16> = (0..length).map(|_| rand::random()).collect();
            roundtrip(&data);
        }
    }

    #[test]
    fn roundtrip_skewed_distribution() {
        let data: Vec<u16> = (0..100_000)
            .map(|_| {
                let roll: f32 = rand::random();
                if roll < 0.8 { 42 }
                else if roll < 0.95 { rand::random::<u16>() % 16 }
                else { rand::random() }
            })
            .collect();

        roundtrip(&data);
    }

    #[test]
    fn truncated_data_is_detected() {
        let data: Vec<u16> = (0..1000).map(|_| rand::random()).collect();
        let compressed = compress(&data).unwrap();

        let truncated = &compressed[..compressed.len() / 2];
        assert!(decompress(truncated, data.len()).is_err());
    }
}
