//! Beacon node HTTP adapter
//!
//! Implements `BeaconNodeGateway` against the standard Beacon API. Numeric
//! fields are quoted decimal strings on the wire.

use crate::domain::{epoch_of, AttestationRecord, AttesterDuty, Epoch, Slot, ValidatorIndex};
use crate::error::{BeaconError, BeaconResult};
use crate::ports::outbound::BeaconNodeGateway;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::time::Duration;
use tracing::debug;

/// Per-request timeouts.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub default: Duration,
    pub attester_duties: Duration,
    pub connect: Duration,
}

impl Timeouts {
    pub fn set_all(timeout: Duration) -> Self {
        Self {
            default: timeout,
            attester_duties: timeout,
            connect: timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::set_all(Duration::from_secs(10))
    }
}

/// Beacon API client.
#[derive(Clone)]
pub struct BeaconNodeHttpClient {
    client: Client,
    server: Url,
    timeouts: Timeouts,
}

impl BeaconNodeHttpClient {
    pub fn new(server: &str, timeouts: Timeouts) -> BeaconResult<Self> {
        let server = Url::parse(server).map_err(|e| BeaconError::Url(e.to_string()))?;
        if server.cannot_be_a_base() || !matches!(server.scheme(), "http" | "https") {
            return Err(BeaconError::Url(format!("{server} is not an http(s) base URL")));
        }

        let client = Client::builder()
            .timeout(timeouts.default)
            .connect_timeout(timeouts.connect)
            .build()?;

        Ok(Self {
            client,
            server,
            timeouts,
        })
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// `<server>/eth/v1/<segments...>`
    fn eth_v1_path(&self, segments: &[&str]) -> BeaconResult<Url> {
        let mut path = self.server.clone();
        path.path_segments_mut()
            .map_err(|()| BeaconError::Url(self.server.to_string()))?
            .pop_if_empty()
            .push("eth")
            .push("v1")
            .extend(segments);
        Ok(path)
    }

    /// GET returning `None` on 404.
    async fn get_opt<T: DeserializeOwned>(&self, url: Url) -> BeaconResult<Option<T>> {
        debug!(%url, "beacon GET");
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Ok(Some(response.error_for_status()?.json().await?))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> BeaconResult<T> {
        let path = url.path().to_string();
        self.get_opt(url).await?.ok_or(BeaconError::Status {
            status: StatusCode::NOT_FOUND.as_u16(),
            path,
        })
    }

    async fn post_with_timeout_and_response<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
        timeout: Duration,
    ) -> BeaconResult<T> {
        debug!(%url, "beacon POST");
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl BeaconNodeGateway for BeaconNodeHttpClient {
    /// `GET beacon/headers/head`
    async fn head_slot(&self) -> BeaconResult<Slot> {
        let path = self.eth_v1_path(&["beacon", "headers", "head"])?;
        let response: GenericResponse<HeaderData> = self.get(path).await?;
        Ok(response.data.header.message.slot)
    }

    /// `POST validator/duties/attester/{epoch}`
    async fn attester_duties(
        &self,
        epoch: Epoch,
        indexes: &[ValidatorIndex],
    ) -> BeaconResult<Vec<AttesterDuty>> {
        let epoch_segment = epoch.to_string();
        let path = self.eth_v1_path(&["validator", "duties", "attester", &epoch_segment])?;
        let body: Vec<String> = indexes.iter().map(ToString::to_string).collect();

        let response: GenericResponse<Vec<AttesterData>> = self
            .post_with_timeout_and_response(path, &body, self.timeouts.attester_duties)
            .await?;

        Ok(response
            .data
            .into_iter()
            .filter(|d| epoch_of(d.slot) == epoch)
            .map(AttesterDuty::from)
            .collect())
    }

    /// `GET beacon/blocks/{slot}/attestations`
    async fn block_attestations(&self, slot: Slot) -> BeaconResult<Option<Vec<AttestationRecord>>> {
        let slot_segment = slot.to_string();
        let path = self.eth_v1_path(&["beacon", "blocks", &slot_segment, "attestations"])?;
        let response: Option<GenericResponse<Vec<AttestationData>>> = self.get_opt(path).await?;
        Ok(response.map(|r| r.data.into_iter().map(AttestationRecord::from).collect()))
    }

    /// `GET beacon/blocks/{slot}/root`
    async fn block_root(&self, slot: Slot) -> BeaconResult<Option<String>> {
        let slot_segment = slot.to_string();
        let path = self.eth_v1_path(&["beacon", "blocks", &slot_segment, "root"])?;
        let response: Option<GenericResponse<RootData>> = self.get_opt(path).await?;
        Ok(response.map(|r| r.data.root))
    }

    /// `GET beacon/states/head/validators/{pubkey}`
    async fn validator_index(&self, pubkey: &str) -> BeaconResult<Option<ValidatorIndex>> {
        let path = self.eth_v1_path(&["beacon", "states", "head", "validators", pubkey])?;
        let response: Option<GenericResponse<ValidatorData>> = self.get_opt(path).await?;
        Ok(response.map(|r| r.data.index))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct GenericResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct HeaderData {
    header: SignedHeader,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct HeaderMessage {
    #[serde_as(as = "DisplayFromStr")]
    slot: Slot,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AttesterData {
    #[serde_as(as = "DisplayFromStr")]
    validator_index: ValidatorIndex,
    #[serde_as(as = "DisplayFromStr")]
    committee_index: u64,
    #[serde_as(as = "DisplayFromStr")]
    committee_length: u64,
    #[serde_as(as = "DisplayFromStr")]
    validator_committee_index: u64,
    #[serde_as(as = "DisplayFromStr")]
    slot: Slot,
}

impl From<AttesterData> for AttesterDuty {
    fn from(d: AttesterData) -> Self {
        Self {
            validator_index: d.validator_index,
            slot: d.slot,
            committee_index: d.committee_index,
            validator_committee_index: d.validator_committee_index,
            committee_length: d.committee_length,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttestationData {
    aggregation_bits: String,
    data: AttestationVote,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AttestationVote {
    #[serde_as(as = "DisplayFromStr")]
    index: u64,
    beacon_block_root: String,
}

impl From<AttestationData> for AttestationRecord {
    fn from(a: AttestationData) -> Self {
        Self {
            committee_index: a.data.index,
            beacon_block_root: a.data.beacon_block_root,
            aggregation_bits: a.aggregation_bits,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RootData {
    root: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ValidatorData {
    #[serde_as(as = "DisplayFromStr")]
    index: ValidatorIndex,
}
