use crate::*;
use std::sync::Arc;

/// Who is voting, where, and with which signing agent.
///
/// Passed explicitly into every protocol call instead of being read from ambient
/// wallet state.
#[derive(Clone)]
pub struct Session {
    pub network: NetworkId,
    pub voter: Address,
    pub agent: Arc<dyn SigningAgent>,
}

impl Session {
    pub fn new(network: NetworkId, voter: Address, agent: Arc<dyn SigningAgent>) -> Self {
        Session {
            network,
            voter,
            agent,
        }
    }

    /// Build a session for whatever address the agent currently signs for.
    pub async fn connect(network: NetworkId, agent: Arc<dyn SigningAgent>) -> Result<Self, Error> {
        let voter = agent.address().await?;
        Ok(Session::new(network, voter, agent))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("network", &self.network)
            .field("voter", &self.voter)
            .finish()
    }
}
