use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Network, NetworkKind};
use satshop_core::{AddressKind, AppError, Settings};

/// Derives one receiving address per user from the master seed.
///
/// The path for user `u` is `<base>/<u >> 31>/<u & 0x7fffffff>`. Both components
/// are normal child indices and the split is injective, so distinct users can
/// never share a path.
pub struct AddressDeriver {
    master: Xpriv,
    base: DerivationPath,
    network: Network,
    kind: AddressKind,
    secp: Secp256k1<All>,
}

impl std::fmt::Debug for AddressDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("AddressDeriver")
            .field("base", &self.base)
            .field("network", &self.network)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl AddressDeriver {
    pub fn new(
        seed: &str,
        network: Network,
        base_path: &str,
        kind: AddressKind,
    ) -> Result<Self, AppError> {
        let master = master_key(seed, network)?;
        let base = DerivationPath::from_str(base_path.trim())
            .map_err(|e| AppError::Config(format!("DERIVATION_PATH `{base_path}`: {e}")))?;

        Ok(Self {
            master,
            base,
            network,
            kind,
            secp: Secp256k1::new(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(
            settings.require_wallet_seed()?,
            parse_network(&settings.network)?,
            &settings.derivation_path,
            settings.address_kind,
        )
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Full derivation path of a user's address.
    pub fn path_for(&self, user_id: i64) -> Result<DerivationPath, AppError> {
        if user_id <= 0 {
            return Err(AppError::InvalidUserId(user_id));
        }
        let id = user_id as u64;
        let hi = ChildNumber::from_normal_idx((id >> 31) as u32)
            .map_err(|_| AppError::InvalidUserId(user_id))?;
        let lo = ChildNumber::from_normal_idx((id & 0x7fff_ffff) as u32)
            .map_err(|_| AppError::InvalidUserId(user_id))?;
        Ok(self.base.extend([hi, lo]))
    }

    /// Receiving address of `user_id`.
    pub fn derive(&self, user_id: i64) -> Result<String, AppError> {
        let path = self.path_for(user_id)?;
        let child = self
            .master
            .derive_priv(&self.secp, &path)
            .map_err(|e| AppError::InvalidSeed(format!("derivation failed: {e}")))?;
        let pubkey = Xpub::from_priv(&self.secp, &child).to_pub();

        let address = match self.kind {
            AddressKind::P2wpkh => Address::p2wpkh(&pubkey, self.network),
            AddressKind::P2pkh => Address::p2pkh(pubkey.pubkey_hash(), self.network),
        };
        Ok(address.to_string())
    }
}

/// Parse `bitcoin`, `testnet`, `signet` or `regtest` (also `main`/`test`).
pub fn parse_network(name: &str) -> Result<Network, AppError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "main" | "mainnet" => Ok(Network::Bitcoin),
        "test" => Ok(Network::Testnet),
        other => Network::from_str(other)
            .map_err(|_| AppError::Config(format!("unknown BTC_NETWORK `{name}`"))),
    }
}

/// Accepts a hex BIP32 seed (16–64 bytes) or an extended private key.
fn master_key(seed: &str, network: Network) -> Result<Xpriv, AppError> {
    let seed = seed.trim();

    if seed.starts_with("xprv") || seed.starts_with("tprv") {
        let xpriv = Xpriv::from_str(seed).map_err(|e| AppError::InvalidSeed(e.to_string()))?;
        if xpriv.network != NetworkKind::from(network) {
            return Err(AppError::InvalidSeed(format!(
                "extended key does not belong to {network}"
            )));
        }
        return Ok(xpriv);
    }

    let bytes = hex::decode(seed).map_err(|e| AppError::InvalidSeed(format!("not hex: {e}")))?;
    if !(16..=64).contains(&bytes.len()) {
        return Err(AppError::InvalidSeed(format!(
            "seed must be 16 to 64 bytes, got {}",
            bytes.len()
        )));
    }
    Xpriv::new_master(network, &bytes).map_err(|e| AppError::InvalidSeed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // BIP32 test vector 1.
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LL8ZMaGhmtHcEQQUEPsjmDFqXvuDqgSUvY";

    fn deriver(kind: AddressKind) -> AddressDeriver {
        AddressDeriver::new(SEED, Network::Bitcoin, "m/84'/0'/0'", kind).unwrap()
    }

    #[test]
    fn derivation_is_deterministic_across_instances() {
        let a = deriver(AddressKind::P2wpkh);
        let b = deriver(AddressKind::P2wpkh);
        for id in [1, 42, 5_000_000_000] {
            assert_eq!(a.derive(id).unwrap(), b.derive(id).unwrap());
            assert_eq!(a.derive(id).unwrap(), a.derive(id).unwrap());
        }
    }

    #[test]
    fn hex_seed_and_xprv_agree() {
        let from_hex = deriver(AddressKind::P2wpkh);
        let from_xprv =
            AddressDeriver::new(XPRV, Network::Bitcoin, "m/84'/0'/0'", AddressKind::P2wpkh)
                .unwrap();
        assert_eq!(from_hex.derive(77).unwrap(), from_xprv.derive(77).unwrap());
    }

    #[test]
    fn distinct_users_get_distinct_addresses() {
        let d = deriver(AddressKind::P2wpkh);
        let lo_bits = 1i64 << 31;
        let ids = [1, 2, 3, 1000, lo_bits - 1, lo_bits, lo_bits + 1, 7_123_456_789];
        let addresses: HashSet<String> = ids.iter().map(|id| d.derive(*id).unwrap()).collect();
        assert_eq!(addresses.len(), ids.len());
    }

    #[test]
    fn path_splits_the_id() {
        let d = deriver(AddressKind::P2wpkh);
        let expected = |s: &str| DerivationPath::from_str(s).unwrap();

        assert_eq!(d.path_for(5).unwrap(), expected("m/84'/0'/0'/0/5"));
        assert_eq!(
            d.path_for((1 << 31) + 5).unwrap(),
            expected("m/84'/0'/0'/1/5")
        );
    }

    #[test]
    fn address_kind_and_network_shape_the_address() {
        assert!(deriver(AddressKind::P2wpkh).derive(9).unwrap().starts_with("bc1q"));
        assert!(deriver(AddressKind::P2pkh).derive(9).unwrap().starts_with('1'));

        let regtest =
            AddressDeriver::new(SEED, Network::Regtest, "m/84'/1'/0'", AddressKind::P2wpkh)
                .unwrap();
        assert!(regtest.derive(9).unwrap().starts_with("bcrt1q"));
    }

    #[test]
    fn bad_seeds_are_rejected() {
        for seed in ["not-hex", "00ff", "xprvgarbage"] {
            let err =
                AddressDeriver::new(seed, Network::Bitcoin, "m/84'/0'/0'", AddressKind::P2wpkh)
                    .unwrap_err();
            assert!(matches!(err, AppError::InvalidSeed(_)), "{seed}: {err}");
        }

        let err = AddressDeriver::new(XPRV, Network::Testnet, "m/84'/1'/0'", AddressKind::P2wpkh)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSeed(_)));
    }

    #[test]
    fn bad_path_is_a_config_error() {
        let err = AddressDeriver::new(SEED, Network::Bitcoin, "84/x", AddressKind::P2wpkh)
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn non_positive_ids_are_rejected() {
        let d = deriver(AddressKind::P2wpkh);
        assert!(matches!(d.derive(0), Err(AppError::InvalidUserId(0))));
        assert!(matches!(d.derive(-3), Err(AppError::InvalidUserId(-3))));
    }

    #[test]
    fn network_names() {
        assert_eq!(parse_network("main").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("regtest").unwrap(), Network::Regtest);
        assert!(parse_network("dogecoin").is_err());
    }
}
