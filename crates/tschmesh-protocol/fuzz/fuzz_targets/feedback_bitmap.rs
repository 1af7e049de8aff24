#![no_main]

use libfuzzer_sys::fuzz_target;
use tschmesh_protocol::Bitmap;

fuzz_target!(|data: &[u8]| {
    // First byte picks the expected bitmap length, the rest is the mote payload.
    // Decoding must never panic on short or padded input.
    let Some((&len, bytes)) = data.split_first() else {
        return;
    };

    if let Ok(bitmap) = Bitmap::from_bytes(bytes, len as usize) {
        assert_eq!(bitmap.len(), len as usize);

        let packed = bitmap.to_bytes();
        let reparsed = Bitmap::from_bytes(&packed, len as usize)
            .expect("packed bitmap must decode at its own length");
        assert_eq!(reparsed, bitmap);

        let _ = bitmap.to_string().parse::<Bitmap>();
    }
});
