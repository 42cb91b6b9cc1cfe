//! Sparse trie nodes and the operations the dispute driver needs on them.

use std::{collections::HashMap, mem};

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{Decodable, Encodable, Header, EMPTY_STRING_CODE};

use crate::{
    error::Error,
    nibbles::{common_prefix_len, decode_path, encode_path, to_nibbles},
    EMPTY_ROOT,
};

/// A node of a Merkle-Patricia trie that may be only partially known.
///
/// Subtrees that no supplied proof opened are kept as [`MptNode::Digest`]. Reading or writing
/// through a digest fails with [`Error::NodeNotResolved`], everything else behaves like a
/// full trie and hashes to the same root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MptNode {
    #[default]
    Null,
    Branch(Box<[MptNode; 16]>, Option<Bytes>),
    Leaf(Vec<u8>, Bytes),
    Extension(Vec<u8>, Box<MptNode>),
    Digest(B256),
}

fn empty_children() -> Box<[MptNode; 16]> {
    Box::new(std::array::from_fn(|_| MptNode::Null))
}

impl MptNode {
    /// Trie known only by its root hash. The empty root becomes [`MptNode::Null`].
    pub fn from_digest(root: B256) -> Self {
        if root == EMPTY_ROOT {
            Self::Null
        } else {
            Self::Digest(root)
        }
    }

    /// Rebuilds a sparse trie from a flat list of proof nodes.
    ///
    /// The first node is the root. Every node is indexed by its hash so hash references
    /// resolve regardless of which proof supplied them, and nodes shared by several proofs
    /// collapse into one.
    pub fn from_proof_nodes(nodes: &[Bytes]) -> Result<Self, Error> {
        let Some(root) = nodes.first() else {
            return Ok(Self::Null);
        };

        let by_hash: HashMap<B256, &Bytes> = nodes.iter().map(|n| (keccak256(n), n)).collect();
        let mut node = Self::decode(root)?;
        node.resolve(&by_hash)?;
        Ok(node)
    }

    fn resolve(&mut self, by_hash: &HashMap<B256, &Bytes>) -> Result<(), Error> {
        match self {
            Self::Digest(hash) => {
                if let Some(raw) = by_hash.get(hash) {
                    let mut node = Self::decode(raw)?;
                    node.resolve(by_hash)?;
                    *self = node;
                }
            }
            Self::Branch(children, _) => {
                for child in children.iter_mut() {
                    child.resolve(by_hash)?;
                }
            }
            Self::Extension(_, child) => child.resolve(by_hash)?,
            Self::Null | Self::Leaf(..) => {}
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Root hash. The root is always hashed, even when its encoding is shorter than 32
    /// bytes.
    pub fn hash(&self) -> B256 {
        match self {
            Self::Null => EMPTY_ROOT,
            Self::Digest(hash) => *hash,
            _ => keccak256(self.rlp_encoded()),
        }
    }

    /// Looks up the raw value stored at `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>, Error> {
        let path = to_nibbles(key);
        let mut node = self;
        let mut rest = path.as_slice();
        loop {
            match node {
                Self::Null => return Ok(None),
                Self::Digest(hash) => return Err(Error::NodeNotResolved(*hash)),
                Self::Leaf(lpath, value) => {
                    return Ok((lpath.as_slice() == rest).then_some(&value[..]));
                }
                Self::Extension(epath, child) => {
                    let Some(tail) = rest.strip_prefix(epath.as_slice()) else {
                        return Ok(None);
                    };
                    rest = tail;
                    node = child;
                }
                Self::Branch(children, value) => {
                    let Some((first, tail)) = rest.split_first() else {
                        return Ok(value.as_ref().map(|v| &v[..]));
                    };
                    rest = tail;
                    node = &children[*first as usize];
                }
            }
        }
    }

    /// Looks up and RLP decodes the value stored at `key`.
    pub fn get_rlp<T: Decodable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
        match self.get(key)? {
            Some(mut raw) => Ok(Some(T::decode(&mut raw)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` at `key`. An empty value deletes the key.
    pub fn insert(&mut self, key: &[u8], value: Bytes) -> Result<(), Error> {
        if value.is_empty() {
            self.delete(key)?;
            return Ok(());
        }
        // Work on a copy so a failed walk leaves the trie untouched.
        *self = self.clone().insert_at(&to_nibbles(key), value)?;
        Ok(())
    }

    /// RLP encodes `value` and stores it at `key`.
    pub fn insert_rlp(&mut self, key: &[u8], value: impl Encodable) -> Result<(), Error> {
        self.insert(key, alloy_rlp::encode(value).into())
    }

    /// Removes `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, Error> {
        let (node, removed) = self.clone().delete_at(&to_nibbles(key))?;
        *self = node;
        Ok(removed)
    }

    fn insert_at(self, path: &[u8], value: Bytes) -> Result<Self, Error> {
        match self {
            Self::Null => Ok(Self::Leaf(path.to_vec(), value)),
            Self::Digest(hash) => Err(Error::NodeNotResolved(hash)),
            Self::Leaf(lpath, lvalue) => {
                if lpath == path {
                    return Ok(Self::Leaf(lpath, value));
                }
                let common = common_prefix_len(&lpath, path);
                let mut children = empty_children();
                let mut branch_value = None;
                for (p, v) in [(&lpath[common..], lvalue), (&path[common..], value)] {
                    match p.split_first() {
                        None => branch_value = Some(v),
                        Some((first, tail)) => {
                            children[*first as usize] = Self::Leaf(tail.to_vec(), v)
                        }
                    }
                }
                Ok(wrap_extension(
                    &path[..common],
                    Self::Branch(children, branch_value),
                ))
            }
            Self::Extension(epath, child) => {
                let common = common_prefix_len(&epath, path);
                if common == epath.len() {
                    let child = (*child).insert_at(&path[common..], value)?;
                    return Ok(Self::Extension(epath, Box::new(child)));
                }

                let mut children = empty_children();
                let ext_rest = &epath[common + 1..];
                children[epath[common] as usize] = wrap_extension(ext_rest, *child);

                let mut branch_value = None;
                match path[common..].split_first() {
                    None => branch_value = Some(value),
                    Some((first, tail)) => {
                        children[*first as usize] = Self::Leaf(tail.to_vec(), value)
                    }
                }
                Ok(wrap_extension(
                    &path[..common],
                    Self::Branch(children, branch_value),
                ))
            }
            Self::Branch(mut children, branch_value) => match path.split_first() {
                None => Ok(Self::Branch(children, Some(value))),
                Some((first, tail)) => {
                    let slot = &mut children[*first as usize];
                    let child = mem::take(slot);
                    *slot = child.insert_at(tail, value)?;
                    Ok(Self::Branch(children, branch_value))
                }
            },
        }
    }

    fn delete_at(self, path: &[u8]) -> Result<(Self, bool), Error> {
        match self {
            Self::Null => Ok((Self::Null, false)),
            Self::Digest(hash) => Err(Error::NodeNotResolved(hash)),
            Self::Leaf(lpath, value) => {
                if lpath == path {
                    Ok((Self::Null, true))
                } else {
                    Ok((Self::Leaf(lpath, value), false))
                }
            }
            Self::Extension(epath, child) => {
                let Some(tail) = path.strip_prefix(epath.as_slice()) else {
                    return Ok((Self::Extension(epath, child), false));
                };
                let (child, removed) = (*child).delete_at(tail)?;
                if !removed {
                    return Ok((Self::Extension(epath, Box::new(child)), false));
                }
                Ok((wrap_extension(&epath, child), true))
            }
            Self::Branch(mut children, mut value) => {
                let removed = match path.split_first() {
                    None => value.take().is_some(),
                    Some((first, tail)) => {
                        let slot = &mut children[*first as usize];
                        let (child, removed) = mem::take(slot).delete_at(tail)?;
                        *slot = child;
                        removed
                    }
                };
                if !removed {
                    return Ok((Self::Branch(children, value), false));
                }
                Ok((collapse_branch(children, value)?, true))
            }
        }
    }

    /// Nodes on the path from the root towards `key`, root first.
    ///
    /// For absent keys the path stops where the key diverges, which is what an exclusion
    /// or insertion proof needs. Inline nodes are listed too.
    pub fn prove(&self, key: &[u8]) -> Result<Vec<Bytes>, Error> {
        let path = to_nibbles(key);
        let mut proof = Vec::new();
        let mut node = self;
        let mut rest = path.as_slice();
        loop {
            match node {
                Self::Null => return Ok(proof),
                Self::Digest(hash) => return Err(Error::NodeNotResolved(*hash)),
                _ => proof.push(node.rlp_encoded().into()),
            }
            match node {
                Self::Extension(epath, child) => match rest.strip_prefix(epath.as_slice()) {
                    Some(tail) => {
                        rest = tail;
                        node = child;
                    }
                    None => return Ok(proof),
                },
                Self::Branch(children, _) => match rest.split_first() {
                    Some((first, tail)) => {
                        let child = &children[*first as usize];
                        if child.is_empty() {
                            return Ok(proof);
                        }
                        rest = tail;
                        node = child;
                    }
                    None => return Ok(proof),
                },
                _ => return Ok(proof),
            }
        }
    }

    /// RLP encoding of this node.
    pub fn rlp_encoded(&self) -> Vec<u8> {
        match self {
            Self::Null => vec![EMPTY_STRING_CODE],
            Self::Digest(hash) => encode_string(hash.as_slice()),
            Self::Leaf(path, value) => {
                let mut payload = encode_string(&encode_path(path, true));
                payload.extend(encode_string(value));
                encode_list(&payload)
            }
            Self::Extension(path, child) => {
                let mut payload = encode_string(&encode_path(path, false));
                payload.extend(child.reference());
                encode_list(&payload)
            }
            Self::Branch(children, value) => {
                let mut payload = Vec::with_capacity(17 * 33);
                for child in children.iter() {
                    payload.extend(child.reference());
                }
                payload.extend(encode_string(value.as_ref().map_or(&[][..], |v| &v[..])));
                encode_list(&payload)
            }
        }
    }

    /// How a parent embeds this node: inline when shorter than 32 bytes, else by hash.
    fn reference(&self) -> Vec<u8> {
        match self {
            Self::Null => vec![EMPTY_STRING_CODE],
            Self::Digest(hash) => encode_string(hash.as_slice()),
            _ => {
                let encoded = self.rlp_encoded();
                if encoded.len() < 32 {
                    encoded
                } else {
                    encode_string(keccak256(&encoded).as_slice())
                }
            }
        }
    }

    /// Decodes one RLP trie node. Hash references become [`MptNode::Digest`].
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        let items = list_items(raw)?;
        match items.len() {
            17 => {
                let mut children = empty_children();
                for (slot, item) in children.iter_mut().zip(&items[..16]) {
                    *slot = Self::from_reference(item)?;
                }
                let value = match items[16] {
                    RlpItem::Bytes(b) if !b.is_empty() => Some(Bytes::copy_from_slice(b)),
                    RlpItem::Bytes(_) => None,
                    RlpItem::List(_) => return Err(Error::InvalidNode("list as branch value")),
                };
                Ok(Self::Branch(children, value))
            }
            2 => {
                let RlpItem::Bytes(encoded_path) = items[0] else {
                    return Err(Error::InvalidNode("list as path"));
                };
                let (path, is_leaf) = decode_path(encoded_path)?;
                if is_leaf {
                    let RlpItem::Bytes(value) = items[1] else {
                        return Err(Error::InvalidNode("list as leaf value"));
                    };
                    Ok(Self::Leaf(path, Bytes::copy_from_slice(value)))
                } else {
                    let child = Self::from_reference(&items[1])?;
                    Ok(Self::Extension(path, Box::new(child)))
                }
            }
            _ => Err(Error::InvalidNode("unexpected item count")),
        }
    }

    fn from_reference(item: &RlpItem<'_>) -> Result<Self, Error> {
        match item {
            RlpItem::List(raw) => Self::decode(raw),
            RlpItem::Bytes(b) if b.is_empty() => Ok(Self::Null),
            RlpItem::Bytes(b) if b.len() == 32 => Ok(Self::Digest(B256::from_slice(b))),
            RlpItem::Bytes(_) => Err(Error::InvalidNode("bad child reference")),
        }
    }
}

/// Prefixes `node` with `path`, merging consecutive path segments.
fn wrap_extension(path: &[u8], node: MptNode) -> MptNode {
    if path.is_empty() {
        return node;
    }
    match node {
        MptNode::Null => MptNode::Null,
        MptNode::Leaf(p, v) => MptNode::Leaf([path, &p].concat(), v),
        MptNode::Extension(p, c) => MptNode::Extension([path, &p].concat(), c),
        other => MptNode::Extension(path.to_vec(), Box::new(other)),
    }
}

/// Restores the canonical shape of a branch after one of its entries was removed.
fn collapse_branch(mut children: Box<[MptNode; 16]>, value: Option<Bytes>) -> Result<MptNode, Error> {
    let mut occupied = children
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_empty())
        .map(|(i, _)| i);
    let first = occupied.next();
    let more = occupied.next().is_some();

    match (first, more, value) {
        (None, _, None) => Ok(MptNode::Null),
        (None, _, Some(v)) => Ok(MptNode::Leaf(Vec::new(), v)),
        (Some(idx), false, None) => {
            let child = mem::take(&mut children[idx]);
            if let MptNode::Digest(hash) = child {
                // Cannot tell whether the lone child should merge into a longer path.
                return Err(Error::NodeNotResolved(hash));
            }
            Ok(wrap_extension(&[idx as u8], child))
        }
        (_, _, value) => Ok(MptNode::Branch(children, value)),
    }
}

enum RlpItem<'a> {
    Bytes(&'a [u8]),
    /// Full encoding of a nested list, header included.
    List(&'a [u8]),
}

fn list_items(raw: &[u8]) -> Result<Vec<RlpItem<'_>>, Error> {
    let mut buf = raw;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(Error::InvalidNode("node is not a list"));
    }
    let mut payload = buf
        .get(..header.payload_length)
        .ok_or(alloy_rlp::Error::InputTooShort)?;

    let mut items = Vec::with_capacity(17);
    while !payload.is_empty() {
        let start = payload;
        let item = Header::decode(&mut payload)?;
        let header_len = start.len() - payload.len();
        let body = payload
            .get(..item.payload_length)
            .ok_or(alloy_rlp::Error::InputTooShort)?;
        items.push(if item.list {
            RlpItem::List(&start[..header_len + item.payload_length])
        } else {
            RlpItem::Bytes(body)
        });
        payload = &payload[item.payload_length..];
    }
    Ok(items)
}

fn encode_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    if bytes.len() == 1 && bytes[0] < EMPTY_STRING_CODE {
        out.push(bytes[0]);
    } else {
        Header {
            list: false,
            payload_length: bytes.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(bytes);
    }
    out
}

fn encode_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(payload);
    out
}
