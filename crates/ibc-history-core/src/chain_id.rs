//! Chain id canonicalization.
//!
//! Chain ids conventionally end in a revision number (`cosmoshub-4`,
//! `osmosis-1`) that changes on hard forks. Everything keyed by chain uses the
//! identifier with that suffix stripped so records survive upgrades.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIdParts<'a> {
    pub identifier: &'a str,
    pub version: u64,
}

/// Split `<name>-<digits>` into name and version. Ids without a numeric
/// suffix are their own identifier with version 0.
pub fn parse_chain_id(chain_id: &str) -> ChainIdParts<'_> {
    if let Some((name, suffix)) = chain_id.rsplit_once('-') {
        if !name.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(version) = suffix.parse::<u64>() {
                return ChainIdParts {
                    identifier: name,
                    version,
                };
            }
        }
    }
    ChainIdParts {
        identifier: chain_id,
        version: 0,
    }
}

pub fn chain_identifier(chain_id: &str) -> &str {
    parse_chain_id(chain_id).identifier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_revision_suffix() {
        assert_eq!(
            parse_chain_id("cosmoshub-4"),
            ChainIdParts {
                identifier: "cosmoshub",
                version: 4
            }
        );
        assert_eq!(chain_identifier("osmosis-1"), "osmosis");
    }

    #[test]
    fn only_the_last_numeric_suffix_is_stripped() {
        assert_eq!(chain_identifier("evmos_9001-2"), "evmos_9001");
        assert_eq!(chain_identifier("crypto-org-chain-mainnet-1"), "crypto-org-chain-mainnet");
    }

    #[test]
    fn ids_without_numeric_suffix_are_unchanged() {
        assert_eq!(parse_chain_id("juno").version, 0);
        assert_eq!(chain_identifier("juno"), "juno");
        assert_eq!(chain_identifier("axelar-dojo"), "axelar-dojo");
        assert_eq!(chain_identifier("-7"), "-7");
        assert_eq!(chain_identifier("chain-"), "chain-");
    }
}
