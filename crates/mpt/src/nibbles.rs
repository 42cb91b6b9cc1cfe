//! Nibble paths and their hex-prefix encoding.

use crate::error::Error;

pub(crate) fn to_nibbles(key: &[u8]) -> Vec<u8> {
    key.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Hex-prefix encodes a nibble path, flagging leaves and odd lengths in the first nibble.
pub(crate) fn encode_path(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let odd = nibbles.len() % 2 == 1;
    let flag = (if is_leaf { 2 } else { 0 }) + u8::from(odd);

    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if odd {
        out.push((flag << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    out.extend(rest.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]));
    out
}

/// Inverse of [`encode_path`]; returns the nibbles and whether the node is a leaf.
pub(crate) fn decode_path(encoded: &[u8]) -> Result<(Vec<u8>, bool), Error> {
    let first = *encoded
        .first()
        .ok_or(Error::InvalidNode("empty path"))?;
    let flag = first >> 4;
    if flag > 3 {
        return Err(Error::InvalidNode("bad path flag"));
    }

    let is_leaf = flag & 2 != 0;
    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if flag & 1 != 0 {
        nibbles.push(first & 0x0f);
    }
    nibbles.extend(to_nibbles(&encoded[1..]));
    Ok((nibbles, is_leaf))
}
