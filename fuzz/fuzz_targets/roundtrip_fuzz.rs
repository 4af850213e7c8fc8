#![no_main]
use libfuzzer_sys::fuzz_target;
use snappy_wire::raw;

fuzz_target!(|data: &[u8]| {
    let mut encoded = Vec::new();
    raw::encode(&mut encoded, data).expect("fuzz inputs are never oversized");
    assert!(encoded.len() <= raw::max_encoded_len(data.len()).unwrap());

    let roundtripped = decode(&encoded);
    assert!(roundtripped.iter().eq(data));
});

/// Minimal block decoder, just enough to check the encoder's output.
fn decode(encoded: &[u8]) -> Vec<u8> {
    let mut i = 0;
    let mut expected_len = 0u64;
    let mut shift = 0;
    loop {
        let b = encoded[i];
        i += 1;
        expected_len |= u64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            break;
        }
    }

    let mut out = Vec::with_capacity(expected_len as usize);
    while i < encoded.len() {
        let tag = encoded[i];
        let (len, offset) = match tag & 0b11 {
            0b00 => {
                let mut len = (tag >> 2) as usize;
                i += 1;
                if len >= 60 {
                    let extra = len - 59;
                    len = 0;
                    for (k, &b) in encoded[i..i + extra].iter().enumerate() {
                        len |= (b as usize) << (8 * k);
                    }
                    i += extra;
                }
                out.extend_from_slice(&encoded[i..i + len + 1]);
                i += len + 1;
                continue;
            }
            0b01 => {
                let len = 4 + ((tag >> 2) & 0b111) as usize;
                let offset = ((tag >> 5) as usize) << 8 | encoded[i + 1] as usize;
                i += 2;
                (len, offset)
            }
            0b10 => {
                let len = 1 + (tag >> 2) as usize;
                let offset = encoded[i + 1] as usize | (encoded[i + 2] as usize) << 8;
                i += 3;
                (len, offset)
            }
            _ => panic!("4-byte-offset copies are never emitted"),
        };
        assert!(offset >= 1 && offset <= out.len());
        let start = out.len() - offset;
        for k in 0..len {
            let b = out[start + k];
            out.push(b);
        }
    }
    assert_eq!(out.len() as u64, expected_len);
    out
}
