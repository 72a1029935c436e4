use crate::*;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// Where a network's key artifacts can be downloaded
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyDirectory {
    pub public_key_id: String,
    pub public_key_url: String,
    pub public_params_id: String,
    pub public_params_url: String,
}

/// Public encryption key and parameters for one network. Immutable once fetched.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NetworkKeyMaterial {
    pub network: NetworkId,
    pub public_key_id: String,

    #[serde(with = "hex_serde")]
    pub public_key: Vec<u8>,
    pub public_params_id: String,

    #[serde(with = "hex_serde")]
    pub public_params: Vec<u8>,
}

// Key artifacts run to megabytes, so only their sizes are printed.
impl std::fmt::Debug for NetworkKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("NetworkKeyMaterial")
            .field("network", &self.network)
            .field("public_key_id", &self.public_key_id)
            .field("public_key_len", &self.public_key.len())
            .field("public_params_id", &self.public_params_id)
            .field("public_params_len", &self.public_params.len())
            .finish()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<NetworkKeyMaterial>, Error>>>;

enum Slot {
    Ready(Arc<NetworkKeyMaterial>),
    Pending(SharedFetch),
}

type Slots = Arc<Mutex<HashMap<NetworkId, Slot>>>;

/// Process-lifetime cache of key material, one entry per network.
///
/// Concurrent resolutions of the same uncached network share a single fetch.
pub struct KeyMaterialCache {
    networks: Arc<NetworkTable>,
    service: Arc<dyn KeyService>,
    slots: Slots,
}

impl KeyMaterialCache {
    pub fn new(networks: Arc<NetworkTable>, service: Arc<dyn KeyService>) -> Self {
        KeyMaterialCache {
            networks,
            service,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn networks(&self) -> &NetworkTable {
        &self.networks
    }

    pub fn service(&self) -> &Arc<dyn KeyService> {
        &self.service
    }

    /// Resolve key material for a network, fetching it at most once.
    #[instrument(level = "debug", skip_all, fields(network = %network))]
    pub async fn resolve(&self, network: NetworkId) -> Result<Arc<NetworkKeyMaterial>, Error> {
        let profile = self.networks.get(network)?.key_service.clone();

        let fetch = {
            let mut slots = lock(&self.slots);
            match slots.get(&network) {
                Some(Slot::Ready(material)) => return Ok(material.clone()),
                Some(Slot::Pending(fetch)) => {
                    debug!("joining in-flight key fetch for network {}", network);
                    fetch.clone()
                }
                None => {
                    let fetch = self.start_fetch(network, profile);
                    slots.insert(network, Slot::Pending(fetch.clone()));
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Material already in the cache, without fetching.
    pub fn cached(&self, network: NetworkId) -> Option<Arc<NetworkKeyMaterial>> {
        match lock(&self.slots).get(&network) {
            Some(Slot::Ready(material)) => Some(material.clone()),
            _ => None,
        }
    }

    /// Drop every cached entry. Fetches already in flight keep running and
    /// still populate the cache when they complete.
    pub fn clear(&self) {
        lock(&self.slots).retain(|_, slot| matches!(slot, Slot::Pending(_)));
    }

    fn start_fetch(&self, network: NetworkId, profile: KeyServiceProfile) -> SharedFetch {
        let service = self.service.clone();
        let slots = self.slots.clone();

        async move {
            info!("fetching key material for network {}", network);
            let result = fetch_material(service.as_ref(), network, &profile)
                .await
                .map(Arc::new);
            settle(&slots, network, &result);
            result
        }
        .boxed()
        .shared()
    }
}

// Replace the pending slot with the outcome. Failures leave nothing behind.
fn settle(slots: &Slots, network: NetworkId, result: &Result<Arc<NetworkKeyMaterial>, Error>) {
    let mut slots = lock(slots);
    match result {
        Ok(material) => {
            slots.insert(network, Slot::Ready(material.clone()));
        }
        Err(e) => {
            warn!("key material fetch for network {} failed: {}", network, e);
            if let Some(Slot::Pending(_)) = slots.get(&network) {
                slots.remove(&network);
            }
        }
    }
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<NetworkId, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn fetch_material(
    service: &dyn KeyService,
    network: NetworkId,
    profile: &KeyServiceProfile,
) -> Result<NetworkKeyMaterial, Error> {
    let stage_failed = |stage| move |cause| Error::KeyFetchFailed { stage, cause };

    let document = service
        .fetch_directory(profile)
        .await
        .map_err(stage_failed(FetchStage::Directory))?;
    let directory = profile
        .parse_directory(&document)
        .map_err(stage_failed(FetchStage::Directory))?;

    let (public_key, public_params) = futures::try_join!(
        download(service, &directory.public_key_url, FetchStage::PublicKey),
        download(service, &directory.public_params_url, FetchStage::PublicParams),
    )?;

    Ok(NetworkKeyMaterial {
        network,
        public_key_id: directory.public_key_id,
        public_key,
        public_params_id: directory.public_params_id,
        public_params,
    })
}

async fn download(service: &dyn KeyService, url: &str, stage: FetchStage) -> Result<Vec<u8>, Error> {
    let bytes = service
        .download(url)
        .await
        .map_err(|cause| Error::KeyFetchFailed { stage, cause })?;

    if bytes.is_empty() {
        return Err(Error::KeyFetchFailed {
            stage,
            cause: ServiceError::Malformed(format!("empty artifact at {}", url)),
        });
    }

    Ok(bytes)
}
