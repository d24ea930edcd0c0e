//! Key-to-server selection via rendezvous hashing.
//!
//! For each key the selector produces an *ordered* candidate list of server
//! tags: the first entry is the key's home server, the rest are the failover
//! order. Highest-random-weight (rendezvous) hashing gives both properties
//! at once: every key gets a full deterministic preference ranking over the
//! servers, and removing a server only remaps the keys that ranked it first
//! (each onto its second choice) instead of reshuffling the keyspace.
//!
//! Hashing is FNV-1a 64 over `tag`, a separator byte, and the key. The hash
//! is a fixed constant algorithm, so the ordering is identical across
//! processes and over time for a fixed server set, which is how the whole cluster routes
//! consistently without any coordination service.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit over one or more byte slices.
fn fnv1a64(parts: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for part in parts {
        for b in *part {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Deterministically maps a key to an ordered candidate list of server tags.
///
/// Immutable after construction, like the registry it is built from.
#[derive(Debug)]
pub struct ServerSelector {
    tags: Vec<String>,
    automatic_failover: bool,
}

impl ServerSelector {
    pub fn new(tags: Vec<String>, automatic_failover: bool) -> Self {
        ServerSelector {
            tags,
            automatic_failover,
        }
    }

    /// Ordered candidate servers for `key`, most preferred first.
    ///
    /// With a single configured server the answer is trivial. With
    /// automatic failover disabled the list is truncated to the home server
    /// only, so a down server means the key is unreachable rather than
    /// silently rehomed.
    pub fn candidates(&self, key: &str) -> Vec<&str> {
        if self.tags.len() == 1 {
            return vec![self.tags[0].as_str()];
        }

        let mut ranked: Vec<(u64, &str)> = self
            .tags
            .iter()
            .map(|tag| {
                let weight = fnv1a64(&[tag.as_bytes(), b"/", key.as_bytes()]);
                (weight, tag.as_str())
            })
            .collect();
        // Tag as tiebreaker keeps the order total even on a weight collision.
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let take = if self.automatic_failover {
            ranked.len()
        } else {
            1
        };
        ranked.into_iter().take(take).map(|(_, tag)| tag).collect()
    }

    /// The key's home server (first candidate).
    pub fn primary(&self, key: &str) -> &str {
        self.candidates(key)[0]
    }

    pub fn server_count(&self) -> usize {
        self.tags.len()
    }
}
