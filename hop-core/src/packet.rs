//! Packets: addressed, routed message units and their binary framing.
//!
//! Layout (all integers 4-byte big-endian signed):
//! `source | target | route_len | route_len * id | payload_len | payload`.

use crate::identity::{Identifier, IdentifierError, ID_LENGTH};

/// Size of a length field.
pub const LEN_SIZE: usize = 4;

/// Largest encodable packet; lengths travel as signed 32-bit integers.
pub const MAX_PACKET_LEN: usize = i32::MAX as usize;

/// Immutable message unit. Equality covers all four fields, route included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    source: Identifier,
    target: Identifier,
    route: Vec<Identifier>,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(
        source: Identifier,
        route: Vec<Identifier>,
        target: Identifier,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source,
            target,
            route,
            payload,
        }
    }

    pub fn source(&self) -> Identifier {
        self.source
    }

    pub fn target(&self) -> Identifier {
        self.target
    }

    /// Relay history, oldest first.
    pub fn route(&self) -> &[Identifier] {
        &self.route
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Copy of this packet with `id` appended to the route. Use when handing the packet to `id`.
    pub fn tag(&self, id: Identifier) -> Packet {
        let mut route = Vec::with_capacity(self.route.len() + 1);
        route.extend_from_slice(&self.route);
        route.push(id);
        Packet {
            source: self.source,
            target: self.target,
            route,
            payload: self.payload.clone(),
        }
    }

    /// Exact number of bytes [`Packet::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        (2 + self.route.len()) * ID_LENGTH + 2 * LEN_SIZE + self.payload.len()
    }

    /// Append the encoded packet to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), PacketError> {
        let total = self.encoded_len();
        if total > MAX_PACKET_LEN {
            return Err(PacketError::TooLarge(total));
        }
        // Both counts are bounded by `total`, so they fit in an i32.
        let route_len = self.route.len() as i32;
        let payload_len = self.payload.len() as i32;

        out.reserve(total);
        self.source.write(out);
        self.target.write(out);
        out.extend_from_slice(&route_len.to_be_bytes());
        for id in &self.route {
            id.write(out);
        }
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode one packet from the front of `bytes`.
    /// Returns the packet and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Packet, usize), PacketError> {
        let mut rest = bytes;
        let source = Identifier::read(&mut rest)?;
        let target = Identifier::read(&mut rest)?;

        let route_len = read_len(&mut rest, "route")?;
        let needed = route_len.saturating_mul(ID_LENGTH);
        if rest.len() < needed {
            return Err(PacketError::Truncated {
                needed,
                available: rest.len(),
            });
        }
        let mut route = Vec::with_capacity(route_len);
        for _ in 0..route_len {
            route.push(Identifier::read(&mut rest)?);
        }

        let payload_len = read_len(&mut rest, "payload")?;
        if rest.len() < payload_len {
            return Err(PacketError::Truncated {
                needed: payload_len,
                available: rest.len(),
            });
        }
        let payload = rest[..payload_len].to_vec();
        rest = &rest[payload_len..];

        let consumed = bytes.len() - rest.len();
        Ok((
            Packet {
                source,
                target,
                route,
                payload,
            },
            consumed,
        ))
    }
}

fn read_len(rest: &mut &[u8], field: &'static str) -> Result<usize, PacketError> {
    if rest.len() < LEN_SIZE {
        return Err(PacketError::Truncated {
            needed: LEN_SIZE,
            available: rest.len(),
        });
    }
    let value = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    if value < 0 {
        return Err(PacketError::InvalidLength { field, value });
    }
    *rest = &rest[LEN_SIZE..];
    Ok(value as usize)
}

/// Error decoding or encoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("negative {field} length {value}")]
    InvalidLength { field: &'static str, value: i32 },
    #[error("packet truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}

impl From<IdentifierError> for PacketError {
    fn from(e: IdentifierError) -> Self {
        match e {
            IdentifierError::Truncated { needed, available } => {
                PacketError::Truncated { needed, available }
            }
            // Binary reads never parse text.
            IdentifierError::Format { .. } => PacketError::Truncated {
                needed: ID_LENGTH,
                available: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(route_len: usize, payload: &[u8]) -> Packet {
        Packet::new(
            Identifier::random(),
            (0..route_len).map(|_| Identifier::random()).collect(),
            Identifier::random(),
            payload.to_vec(),
        )
    }

    #[test]
    fn roundtrip() {
        let cases: [(usize, &[u8]); 3] = [(0, b""), (1, b"hi"), (3, &[0xffu8; 300])];
        for (route_len, payload) in cases {
            let p = sample(route_len, payload);
            let bytes = p.encode().unwrap();
            assert_eq!(bytes.len(), p.encoded_len());
            let (decoded, n) = Packet::decode(&bytes).unwrap();
            assert_eq!(n, bytes.len());
            assert_eq!(decoded, p);
        }
    }

    #[test]
    fn encoded_len_formula() {
        let p = sample(2, b"abcde");
        assert_eq!(p.encoded_len(), (2 + 2) * ID_LENGTH + 8 + 5);
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let p = sample(1, b"x");
        let mut bytes = p.encode().unwrap();
        bytes.extend_from_slice(b"tail");
        let (decoded, n) = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, p);
        assert_eq!(&bytes[n..], b"tail");
    }

    #[test]
    fn negative_route_length() {
        let p = sample(0, b"");
        let mut bytes = p.encode().unwrap();
        let at = 2 * ID_LENGTH;
        bytes[at..at + LEN_SIZE].copy_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::InvalidLength {
                field: "route",
                value: -1
            })
        );
    }

    #[test]
    fn negative_payload_length() {
        let p = sample(1, b"");
        let mut bytes = p.encode().unwrap();
        let at = 3 * ID_LENGTH + LEN_SIZE;
        bytes[at..at + LEN_SIZE].copy_from_slice(&i32::MIN.to_be_bytes());
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::InvalidLength {
                field: "payload",
                ..
            })
        ));
    }

    #[test]
    fn truncated_payload() {
        let p = sample(0, b"hello world");
        let bytes = p.encode().unwrap();
        assert!(matches!(
            Packet::decode(&bytes[..bytes.len() - 1]),
            Err(PacketError::Truncated { .. })
        ));
        assert!(matches!(
            Packet::decode(&bytes[..ID_LENGTH + 3]),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn huge_route_count_is_truncation_not_allocation() {
        let p = sample(0, b"");
        let mut bytes = p.encode().unwrap();
        let at = 2 * ID_LENGTH;
        bytes[at..at + LEN_SIZE].copy_from_slice(&i32::MAX.to_be_bytes());
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn tag_appends_without_mutating() {
        let a = Identifier::random();
        let b = Identifier::random();
        let p = Packet::new(Identifier::random(), vec![a], Identifier::random(), b"data".to_vec());
        let tagged = p.tag(b);
        assert_eq!(tagged.route(), &[a, b]);
        assert_eq!(tagged.source(), p.source());
        assert_eq!(tagged.target(), p.target());
        assert_eq!(tagged.payload(), p.payload());
        assert_eq!(p.route(), &[a]);
    }

    #[test]
    fn equality_includes_route() {
        let p = sample(0, b"same");
        let relayed = p.tag(Identifier::random());
        assert_ne!(p, relayed);
        assert_eq!(p, p.clone());
    }
}
