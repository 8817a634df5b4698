//! The output image buffer and the byte-level patch primitives.
//!
//! All accesses are little-endian and bounds-checked; an out-of-bounds
//! patch means the layout phase handed us inconsistent offsets, so these
//! panic rather than return errors.

/// The fully laid out output file, before relocations are applied.
#[derive(Debug, Default)]
pub struct OutputImage {
    pub buf: Vec<u8>,
}

impl OutputImage {
    pub fn new(size: usize) -> OutputImage {
        OutputImage {
            buf: vec![0; size],
        }
    }

    /// Split the buffer into one mutable slice per section so the apply
    /// phase can patch sections in parallel. Ranges must be disjoint;
    /// slices come back in the same order as `ranges`.
    pub fn section_slices(&mut self, ranges: &[(usize, usize)]) -> Vec<&mut [u8]> {
        split_ranges(&mut self.buf, ranges)
    }
}

/// Carve disjoint `(offset, len)` ranges out of one mutable buffer.
pub fn split_ranges<'a>(buf: &'a mut [u8], ranges: &[(usize, usize)]) -> Vec<&'a mut [u8]> {
    let mut order: Vec<usize> = (0..ranges.len()).collect();
    order.sort_unstable_by_key(|&i| ranges[i]);

    let mut out: Vec<(usize, &'a mut [u8])> = Vec::with_capacity(ranges.len());
    let mut rest = buf;
    let mut pos = 0;
    for &i in &order {
        let (offset, len) = ranges[i];
        assert!(offset >= pos, "overlapping section ranges");
        let (_, tail) = core::mem::take(&mut rest).split_at_mut(offset - pos);
        let (slice, tail) = tail.split_at_mut(len);
        rest = tail;
        pos = offset + len;
        out.push((i, slice));
    }
    out.sort_unstable_by_key(|&(i, _)| i);
    out.into_iter().map(|(_, slice)| slice).collect()
}

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    match buf.get(offset..offset + 4) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => panic!("read past the end of the image at {offset:#x}"),
    }
}

pub fn write_u32(buf: &mut [u8], offset: usize, val: u32) {
    put(buf, offset, &val.to_le_bytes());
}

pub fn write_u64(buf: &mut [u8], offset: usize, val: u64) {
    put(buf, offset, &val.to_le_bytes());
}

/// OR a value into an existing instruction word. Relocation fields arrive
/// zeroed from the assembler, so OR-ing fills them without clobbering the
/// opcode bits.
pub fn or_u32(buf: &mut [u8], offset: usize, val: u32) {
    let word = read_u32(buf, offset) | val;
    write_u32(buf, offset, word);
}

pub fn write_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    put(buf, offset, bytes);
}

pub fn fill_zero(buf: &mut [u8], offset: usize, len: usize) {
    match buf.get_mut(offset..offset + len) {
        Some(b) => b.fill(0),
        None => panic!("write past the end of the image at {offset:#x}"),
    }
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    match buf.get_mut(offset..offset + bytes.len()) {
        Some(b) => b.copy_from_slice(bytes),
        None => panic!("write past the end of the image at {offset:#x}"),
    }
}
