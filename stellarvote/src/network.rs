use crate::*;
use std::collections::BTreeMap;

/// A chain identifier
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub const SEPOLIA: NetworkId = NetworkId(11155111);
    pub const LOCAL: NetworkId = NetworkId(31337);
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(NetworkId)
            .map_err(|_| Error::Config(format!("invalid network id: {}", s)))
    }
}

pub const SEPOLIA_RELAYER_URL: &str = "https://relayer.testnet.zama.cloud";
pub const SEPOLIA_VOTING_CONTRACT: &str = "0x376c2e95acb58Fa364D1315D60a743b760f5B46A";
pub const DEFAULT_PARAMS_BITS: u32 = 2048;

/// How key material and user decryption are reached on a given network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyServiceProfile {
    /// A hosted relayer publishing its key directory under `/v1/keyurl`.
    Relayer { base_url: String, params_bits: u32 },

    /// A development gateway publishing a flat key directory.
    Gateway { base_url: String },
}

impl KeyServiceProfile {
    pub fn relayer(base_url: &str) -> Self {
        KeyServiceProfile::Relayer {
            base_url: base_url.trim_end_matches('/').to_owned(),
            params_bits: DEFAULT_PARAMS_BITS,
        }
    }

    pub fn gateway(base_url: &str) -> Self {
        KeyServiceProfile::Gateway {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn directory_url(&self) -> String {
        match self {
            KeyServiceProfile::Relayer { base_url, .. } => format!("{}/v1/keyurl", base_url),
            KeyServiceProfile::Gateway { base_url } => format!("{}/keyurl", base_url),
        }
    }

    pub fn user_decrypt_url(&self) -> String {
        match self {
            KeyServiceProfile::Relayer { base_url, .. } => {
                format!("{}/v1/user-decrypt", base_url)
            }
            KeyServiceProfile::Gateway { base_url } => format!("{}/user-decrypt", base_url),
        }
    }

    /// Extract key identifiers and download locations from a directory document.
    pub fn parse_directory(&self, document: &serde_json::Value) -> Result<KeyDirectory, ServiceError> {
        match self {
            KeyServiceProfile::Relayer { params_bits, .. } => {
                let field = |pointer: &str| -> Result<String, ServiceError> {
                    document
                        .pointer(pointer)
                        .and_then(|v| v.as_str())
                        .filter(|v| !v.is_empty())
                        .map(str::to_owned)
                        .ok_or_else(|| {
                            ServiceError::Malformed(format!("relayer directory is missing {}", pointer))
                        })
                };
                let crs = format!("/response/crs/{}", params_bits);
                Ok(KeyDirectory {
                    public_key_id: field("/response/fhe_key_info/0/fhe_public_key/data_id")?,
                    public_key_url: field("/response/fhe_key_info/0/fhe_public_key/urls/0")?,
                    public_params_id: field(&format!("{}/data_id", crs))?,
                    public_params_url: field(&format!("{}/urls/0", crs))?,
                })
            }
            KeyServiceProfile::Gateway { .. } => {
                let directory: KeyDirectory = serde_json::from_value(document.clone())
                    .map_err(|e| ServiceError::Malformed(e.to_string()))?;
                if directory.public_key_url.is_empty() || directory.public_params_url.is_empty() {
                    return Err(ServiceError::Malformed(
                        "gateway directory has empty download locations".to_owned(),
                    ));
                }
                Ok(directory)
            }
        }
    }
}

/// A network the client is willing to vote on
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetworkProfile {
    pub id: NetworkId,
    pub name: String,

    /// Address of the voting contract deployed on this network
    pub contract: Address,
    pub key_service: KeyServiceProfile,
}

/// The allow-list of supported networks.
#[derive(Clone, Debug, Default)]
pub struct NetworkTable {
    networks: BTreeMap<NetworkId, NetworkProfile>,
}

impl NetworkTable {
    pub fn new() -> Self {
        NetworkTable::default()
    }

    /// The networks with a known voting deployment.
    pub fn with_defaults() -> Self {
        let mut table = NetworkTable::new();
        table.insert(NetworkProfile {
            id: NetworkId::SEPOLIA,
            name: "sepolia".to_owned(),
            contract: Address(SEPOLIA_CONTRACT_BYTES),
            key_service: KeyServiceProfile::relayer(SEPOLIA_RELAYER_URL),
        });
        table
    }

    pub fn insert(&mut self, profile: NetworkProfile) {
        self.networks.insert(profile.id, profile);
    }

    pub fn with(mut self, profile: NetworkProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn get(&self, id: NetworkId) -> Result<&NetworkProfile, Error> {
        self.networks.get(&id).ok_or(Error::UnsupportedNetwork(id))
    }

    pub fn get_mut(&mut self, id: NetworkId) -> Option<&mut NetworkProfile> {
        self.networks.get_mut(&id)
    }

    /// The voting contract for a network. Never guesses for unknown networks.
    pub fn contract_for(&self, id: NetworkId) -> Result<Address, Error> {
        Ok(self.get(id)?.contract)
    }

    pub fn is_supported(&self, id: NetworkId) -> bool {
        self.networks.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.networks.values()
    }
}

const SEPOLIA_CONTRACT_BYTES: [u8; 20] = [
    0x37, 0x6c, 0x2e, 0x95, 0xac, 0xb5, 0x8f, 0xa3, 0x64, 0xd1, 0x31, 0x5d, 0x60, 0xa7, 0x43,
    0xb7, 0x60, 0xf5, 0xb4, 0x6a,
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_table_only_knows_sepolia() {
        let table = NetworkTable::with_defaults();
        let sepolia = table.get(NetworkId::SEPOLIA).unwrap();
        assert_eq!(sepolia.contract, SEPOLIA_VOTING_CONTRACT.parse().unwrap());
        assert_eq!(
            sepolia.key_service.directory_url(),
            "https://relayer.testnet.zama.cloud/v1/keyurl"
        );

        assert_eq!(
            table.contract_for(NetworkId(1)).unwrap_err(),
            Error::UnsupportedNetwork(NetworkId(1))
        );
    }

    #[test]
    fn relayer_directory_is_parsed() {
        let document = json!({
            "response": {
                "fhe_key_info": [{
                    "fhe_public_key": { "data_id": "pk-1", "urls": ["https://keys/pk-1"] }
                }],
                "crs": {
                    "2048": { "data_id": "crs-1", "urls": ["https://keys/crs-1"] }
                }
            }
        });

        let directory = KeyServiceProfile::relayer("https://relayer/")
            .parse_directory(&document)
            .unwrap();
        assert_eq!(directory.public_key_id, "pk-1");
        assert_eq!(directory.public_key_url, "https://keys/pk-1");
        assert_eq!(directory.public_params_id, "crs-1");
        assert_eq!(directory.public_params_url, "https://keys/crs-1");
    }

    #[test]
    fn relayer_directory_missing_crs_is_malformed() {
        let document = json!({
            "response": {
                "fhe_key_info": [{
                    "fhe_public_key": { "data_id": "pk-1", "urls": ["https://keys/pk-1"] }
                }],
                "crs": {}
            }
        });

        let err = KeyServiceProfile::relayer("https://relayer")
            .parse_directory(&document)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn gateway_directory_is_flat() {
        let document = json!({
            "publicKeyId": "pk",
            "publicKeyUrl": "http://gw/pk",
            "publicParamsId": "pp",
            "publicParamsUrl": "http://gw/pp"
        });

        let profile = KeyServiceProfile::gateway("http://gw");
        assert_eq!(profile.directory_url(), "http://gw/keyurl");
        assert_eq!(profile.user_decrypt_url(), "http://gw/user-decrypt");
        let directory = profile.parse_directory(&document).unwrap();
        assert_eq!(directory.public_params_url, "http://gw/pp");
    }
}
