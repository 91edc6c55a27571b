use std::{collections::BTreeSet, time::Instant};

use entronet_chaos::{BlockProducer, ChaosEngine, ChaosError};
use entronet_fhe::{Address, Decryptor, FheError, Handle, MockFheEvaluator};
use entronet_oracle::{
    Chain, EntropyOracle, Message, OracleError, OracleEvent, REQUEST_FEE_WEI,
};
use entronet_telemetry::{TelemetryError, TelemetryHandle};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, NodeSection};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Chaos(#[from] ChaosError),
    #[error(transparent)]
    Fhe(#[from] FheError),
}

/// Outcome of one served request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceReport {
    pub request_id: u64,
    pub consumer: Address,
    pub block_number: u64,
    pub fee_paid: u128,
    pub entropy: Handle,
    pub events: Vec<OracleEvent>,
}

/// Hosts one deployment: simulated chain, seeded engine and request ledger.
pub struct OracleService {
    node: NodeSection,
    chain: Chain<MockFheEvaluator>,
    oracle: EntropyOracle,
    telemetry: TelemetryHandle,
    funded: BTreeSet<Address>,
}

impl OracleService {
    /// Deploys the engine and ledger and installs the configured master seed.
    pub fn new(config: &Config, telemetry: TelemetryHandle) -> Result<Self, ServiceError> {
        let node = config.node.clone();
        let mut chain = Chain::new(
            MockFheEvaluator::new(config.fhe.clone()),
            BlockProducer::new(node.block.clone()),
            node.gas_limit,
        );
        let mut engine = ChaosEngine::new(node.engine_address, node.admin, &config.chaos)?
            .allow_caller(node.oracle_address);

        let seed_input = chain
            .fhe
            .encrypt_input(node.master_seed, node.admin, node.engine_address);
        let seeded = engine.initialize_master_seed(&mut chain.fhe, node.admin, &seed_input);
        chain.end_call();
        seeded?;

        let oracle = EntropyOracle::new(node.oracle_address, node.admin, node.fee_recipient, engine)?;
        info!(
            "oracle service deployed oracle={} engine={} fee_recipient={}",
            node.oracle_address, node.engine_address, node.fee_recipient
        );
        Ok(Self {
            node,
            chain,
            oracle,
            telemetry,
            funded: BTreeSet::new(),
        })
    }

    /// Mines a block and serves one paid request from `consumer`.
    pub fn request(&mut self, consumer: Address, tag: &[u8]) -> Result<ServiceReport, ServiceError> {
        self.ensure_funded(consumer);
        let block_number = self.chain.advance_block()?.number;
        let started = Instant::now();

        let msg = Message::new(consumer).with_value(REQUEST_FEE_WEI);
        let request_id = match self.oracle.request_entropy(&mut self.chain, msg, tag) {
            Ok(id) => id,
            Err(err) => {
                warn!("request rejected consumer={consumer} err={err}");
                self.telemetry.record_counter("oracle.rejections", 1)?;
                return Err(err.into());
            }
        };
        let entropy = self.oracle.get_encrypted_entropy(request_id)?;

        self.telemetry.record_counter("oracle.requests", 1)?;
        self.telemetry.record_counter("oracle.fees_wei", msg.value)?;
        self.telemetry.record_latency_ms(
            "oracle.request_ms",
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        )?;

        Ok(ServiceReport {
            request_id,
            consumer,
            block_number,
            fee_paid: msg.value,
            entropy: entropy.handle(),
            events: self.chain.drain_events(),
        })
    }

    /// Decrypts a request's entropy on behalf of `requester`. Only the
    /// request's consumer passes the capability check.
    pub fn reveal(&self, requester: Address, request_id: u64) -> Result<u64, ServiceError> {
        let entropy = self.oracle.get_encrypted_entropy(request_id)?;
        Ok(self.chain.fhe.decrypt(&requester, &entropy)?)
    }

    pub fn oracle(&self) -> &EntropyOracle {
        &self.oracle
    }

    pub fn chain(&self) -> &Chain<MockFheEvaluator> {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain<MockFheEvaluator> {
        &mut self.chain
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    fn ensure_funded(&mut self, account: Address) {
        if self.funded.insert(account) {
            self.chain.bank.mint(account, u128::from(self.node.faucet_wei));
        }
    }
}

#[cfg(test)]
mod tests {
    use entronet_oracle::RecipientBehavior;
    use entronet_telemetry::TelemetryConfig;
    use pretty_assertions::assert_eq;

    use super::*;

    fn service() -> (OracleService, TelemetryHandle) {
        let config = Config::sample();
        let telemetry = TelemetryHandle::from_config(TelemetryConfig::sample("node-test"));
        let service = OracleService::new(&config, telemetry.clone()).unwrap();
        (service, telemetry)
    }

    #[test]
    fn request_records_metrics() {
        let (mut service, telemetry) = service();
        let consumer = Address::derive("consumer");

        let report = service.request(consumer, b"lottery-draw").unwrap();
        assert_eq!(report.request_id, 1);
        assert_eq!(report.fee_paid, REQUEST_FEE_WEI);
        assert_eq!(report.events.len(), 2);

        let snapshot = telemetry.flush().unwrap();
        assert_eq!(snapshot.counters["oracle.requests"], 1);
        assert_eq!(snapshot.counters["oracle.fees_wei"], REQUEST_FEE_WEI);
        assert!(!snapshot.counters.contains_key("oracle.rejections"));
    }

    #[test]
    fn rejection_is_counted() {
        let (mut service, telemetry) = service();
        let treasury = Config::sample().node.fee_recipient;
        service
            .chain_mut()
            .bank
            .set_behavior(treasury, RecipientBehavior::Reject);

        let err = service.request(Address::derive("consumer"), b"x").unwrap_err();
        assert!(matches!(err, ServiceError::Oracle(OracleError::FeeTransferFailed(_))));
        assert_eq!(telemetry.counter("oracle.rejections").unwrap(), 1);
        assert_eq!(service.oracle().request_count(), 0);
    }

    #[test]
    fn accounts_are_funded_once() {
        let (mut service, _) = service();
        let consumer = Address::derive("consumer");
        service.request(consumer, b"a").unwrap();
        service.request(consumer, b"b").unwrap();
        let faucet = u128::from(Config::sample().node.faucet_wei);
        assert_eq!(
            service.chain().bank.balance_of(&consumer),
            faucet - 2 * REQUEST_FEE_WEI
        );
    }
}
