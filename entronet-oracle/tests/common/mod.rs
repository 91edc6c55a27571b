#![allow(dead_code)]

use entronet_chaos::{BlockConfig, BlockProducer, ChaosConfig, ChaosEngine};
use entronet_fhe::{Address, MockFheEvaluator};
use entronet_oracle::{Chain, EntropyOracle};

pub const GAS_LIMIT: u64 = 30_000_000;
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

pub struct Deployment {
    pub chain: Chain<MockFheEvaluator>,
    pub oracle: EntropyOracle,
    pub admin: Address,
    pub fee_recipient: Address,
    pub user: Address,
}

pub fn deploy() -> Deployment {
    let admin = Address::derive("admin");
    let fee_recipient = Address::derive("treasury");
    let user = Address::derive("user");
    let oracle_address = Address::derive("oracle");

    let engine = ChaosEngine::new(Address::derive("engine"), admin, &ChaosConfig::default())
        .unwrap()
        .allow_caller(oracle_address);
    let oracle = EntropyOracle::new(oracle_address, admin, fee_recipient, engine).unwrap();
    let mut chain = Chain::new(
        MockFheEvaluator::default(),
        BlockProducer::new(BlockConfig::default()),
        GAS_LIMIT,
    );
    chain.bank.mint(user, ONE_ETHER);
    Deployment {
        chain,
        oracle,
        admin,
        fee_recipient,
        user,
    }
}

/// Deployed and seeded with `master`.
pub fn seeded(master: u64) -> Deployment {
    let mut d = deploy();
    let engine_address = d.oracle.engine().address();
    let input = d.chain.fhe.encrypt_input(master, d.admin, engine_address);
    d.oracle
        .engine_mut()
        .initialize_master_seed(&mut d.chain.fhe, d.admin, &input)
        .unwrap();
    d.chain.end_call();
    d
}
