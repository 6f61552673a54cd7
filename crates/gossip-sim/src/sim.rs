use std::path::PathBuf;
use std::time::{Duration, Instant};

use gossip_store::types::now_ms;
use gossip_store::{
    can_receive, AccountAgeWitness, CapabilitySet, ChannelNetwork, Clock, Direction, ManualClock,
    OfferSummary, OwnerKey, Payload, StoreConfig, TradeStatistics, ACCOUNT_AGE_WITNESS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::events::{
    emit, EventConverged, EventFinished, EventNodeReady, EventNodeSummary, EventStarted,
    EventSwept, EventTradePublished,
};
use crate::node::SimNode;

const MARKETS: [(&str, &str); 4] = [("BTC", "USD"), ("BTC", "EUR"), ("XMR", "BTC"), ("ETH", "BTC")];
const PAYMENT_METHODS: [&str; 3] = ["SEPA", "ZELLE", "CASH_BY_MAIL"];
const DAY_MS: u64 = 24 * 60 * 60 * 1000;

pub struct SimConfig {
    pub nodes: usize,
    pub legacy: usize,
    pub trades: usize,
    pub seed: u64,
    pub advance_days: u64,
    pub data_dir: Option<PathBuf>,
    pub max_rounds: u32,
    pub store: StoreConfig,
}

/// Run the simulation. Returns whether every node converged.
pub async fn run(config: SimConfig) -> anyhow::Result<bool> {
    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let clock = ManualClock::new(now_ms());
    let network = ChannelNetwork::new();

    emit(&EventStarted {
        event: "started",
        nodes: config.nodes,
        legacy: config.legacy,
        trades: config.trades,
        seed: config.seed,
    });

    // ── Start nodes; the first `legacy` lack trade statistics ──────
    let mut nodes = Vec::with_capacity(config.nodes);
    for index in 0..config.nodes {
        let capabilities = if index < config.legacy {
            [ACCOUNT_AGE_WITNESS].into_iter().collect()
        } else {
            CapabilitySet::all_known()
        };
        let node = SimNode::start(
            &network,
            index,
            capabilities,
            &config.store,
            &clock,
            config.data_dir.as_deref(),
        )
        .await?;
        emit(&EventNodeReady {
            event: "node_ready",
            node: node.id.to_string(),
            capabilities: node.capabilities.iter().map(|c| c.0).collect(),
            restored: node.handle.len(),
        });
        nodes.push(node);
    }

    // ── Full mesh capability exchange ──────────────────────────────
    for node in &nodes {
        for other in &nodes {
            if other.id != node.id {
                node.handle
                    .on_peer_capabilities_changed(other.id.clone(), other.capabilities.clone());
            }
        }
    }

    // ── Publish: one witness per node, both sides of every trade ───
    let mut published: Vec<Payload> = Vec::new();
    let now = clock.now_ms();
    for node in &nodes {
        let witness: Payload = AccountAgeWitness::new(
            rng.random::<[u8; 20]>().to_vec(),
            now - rng.random_range(0..365) * DAY_MS,
            random_owner(&mut rng),
        )
        .into();
        node.handle.add(witness.clone());
        published.push(witness);
    }

    let capable: Vec<usize> = (config.legacy..config.nodes).collect();
    if !capable.is_empty() {
        for trade in 0..config.trades {
            let taker = capable[rng.random_range(0..capable.len())];
            let maker = capable[rng.random_range(0..capable.len())];
            let offer = random_offer(&mut rng, now);
            let price = rng.random_range(1_000..100_000_000);
            let amount = rng.random_range(offer.min_amount..=offer.amount);
            let deposit_tx: String = hex_id(&mut rng, 32);

            let copy_for = |rng: &mut StdRng, skew: u64| -> Payload {
                TradeStatistics::from_offer(
                    &offer,
                    price,
                    amount,
                    now + skew,
                    deposit_tx.clone(),
                    random_owner(rng),
                )
                .into()
            };
            let skew = rng.random_range(0..60_000);
            let taker_copy = copy_for(&mut rng, 0);
            let maker_copy = copy_for(&mut rng, skew);

            let taker_outcome = nodes[taker].handle.add(taker_copy.clone());
            let maker_outcome = nodes[maker].handle.add(maker_copy);
            emit(&EventTradePublished {
                event: "trade_published",
                trade,
                market: format!("{}/{}", offer.base_currency, offer.counter_currency),
                taker: nodes[taker].id.to_string(),
                maker: nodes[maker].id.to_string(),
                taker_outcome: format!("{taker_outcome:?}"),
                maker_outcome: format!("{maker_outcome:?}"),
            });
            published.push(taker_copy);
        }
    }

    // ── Wait for convergence ───────────────────────────────────────
    let hashes: Vec<_> = published.iter().map(|p| (p.domain_hash(), p)).collect();
    let expected_for = |node: &SimNode| {
        hashes
            .iter()
            .filter(|(_, p)| can_receive(p, &node.capabilities))
            .collect::<Vec<_>>()
    };
    let converge_start = Instant::now();
    let mut converged = false;
    let mut rounds = 0;
    while rounds < config.max_rounds {
        rounds += 1;
        for node in &nodes {
            node.handle.flush().await?;
        }
        converged = nodes.iter().all(|node| {
            expected_for(node)
                .iter()
                .all(|(hash, _)| node.handle.contains(hash))
        });
        if converged {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    emit(&EventConverged {
        event: "converged",
        converged,
        rounds,
        elapsed_ms: converge_start.elapsed().as_millis() as u64,
    });

    // ── Optional expiry pass ───────────────────────────────────────
    if config.advance_days > 0 {
        clock.advance(Duration::from_millis(config.advance_days * DAY_MS));
        for node in &nodes {
            let removed = node.handle.sweep_now().await;
            emit(&EventSwept {
                event: "swept",
                node: node.id.to_string(),
                advanced_days: config.advance_days,
                removed,
                remaining: node.handle.len(),
            });
        }
    }

    // ── Summary ────────────────────────────────────────────────────
    for node in &nodes {
        emit(&EventNodeSummary {
            event: "node_summary",
            node: node.id.to_string(),
            entries: node.handle.len(),
            expected: expected_for(node).len(),
            metrics: node.handle.metrics(),
            markets: node.aggregator.snapshot(),
            lagged: node.aggregator.lagged(),
        });
    }

    for node in nodes {
        node.stop(&network).await;
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!(converged, elapsed_ms, "simulation finished");
    emit(&EventFinished {
        event: "finished",
        converged,
        elapsed_ms,
    });
    Ok(converged)
}

fn random_offer(rng: &mut StdRng, now: u64) -> OfferSummary {
    let (base, counter) = MARKETS[rng.random_range(0..MARKETS.len())];
    let amount = rng.random_range(10_000..10_000_000u64);
    OfferSummary {
        id: hex_id(rng, 16),
        direction: if rng.random() { Direction::Buy } else { Direction::Sell },
        base_currency: base.into(),
        counter_currency: counter.into(),
        payment_method_id: PAYMENT_METHODS[rng.random_range(0..PAYMENT_METHODS.len())].into(),
        date: now - rng.random_range(0..DAY_MS),
        use_market_based_price: rng.random(),
        market_price_margin: f64::from(rng.random_range(-500i32..=500)) / 10_000.0,
        amount,
        min_amount: amount / 2,
    }
}

/// Owner key of a fresh ed25519 identity.
fn random_owner(rng: &mut StdRng) -> OwnerKey {
    let signing = ed25519_dalek::SigningKey::from_bytes(&rng.random());
    OwnerKey::from_verifying_key(&signing.verifying_key())
}

fn hex_id(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect()
}
