/// Calculates the Internet Checksum from [RFC1071](https://tools.ietf.org/html/rfc1071).
///
/// The bytes are summed as big endian 16 bit words, an odd trailing byte being
/// padded with a zero. See [IPv4 header checksum](https://en.wikipedia.org/wiki/IPv4_header_checksum)
/// for an example.
pub fn internet_checksum<I>(bytes: I) -> u16
where
    I: IntoIterator<Item = u8>,
{
    !fold(sum(bytes))
}

/// Sums a byte stream as big endian 16 bit words without folding carries.
pub fn sum<I>(bytes: I) -> u32
where
    I: IntoIterator<Item = u8>,
{
    let mut acc = 0 as u32;
    let mut bytes = bytes.into_iter();

    loop {
        match (bytes.next(), bytes.next()) {
            (Some(hi), Some(lo)) => acc += ((hi as u32) << 8) | lo as u32,
            (Some(hi), None) => {
                acc += (hi as u32) << 8;
                break;
            }
            _ => break,
        }

        // Keep the accumulator small enough for arbitrarily long streams.
        if acc > 0xFFFF_0000 {
            acc = (acc & 0xFFFF) + (acc >> 16);
        }
    }

    acc
}

/// Folds carries of an accumulated sum into a 16 bit ones complement sum.
pub fn fold(mut acc: u32) -> u16 {
    while acc > 0xFFFF {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }

    acc as u16
}
