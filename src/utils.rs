/// CRC-16/CCITT (polynomial 0x1021, initial value 0xFFFF, no reflection, no final xor)
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= u16::from(b) << 8;
        for _ in 0 .. 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            }
            else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// standard CRC-32 over consecutive byte slices, as if they were concatenated
pub fn crc32<'a>(parts: impl IntoIterator<Item=&'a [u8]>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// pack bytes into little endian words, padding the last word with zeros
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[.. chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// unpack little endian words into exactly `len` bytes
pub fn words_to_bytes(words: &[u32], len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    bytes.truncate(len);
    bytes
}

/// number of words needed to hold `len` bytes
pub const fn words_for(len: usize) -> usize {
    len.div_ceil(4)
}
