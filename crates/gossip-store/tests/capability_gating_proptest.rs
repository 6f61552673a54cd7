mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use gossip_store::{
    can_receive, wire, CapabilityId, CapabilitySet, GossipStore, ManualClock, MemoryBackend,
    Payload, PeerId, StoreChannels, StoreConfig, ACCOUNT_AGE_WITNESS, TRADE_STATISTICS,
};
use proptest::prelude::*;

const PEERS: [&str; 3] = ["p0", "p1", "p2"];

#[derive(Debug, Clone)]
enum Op {
    SetCapabilities { peer: usize, caps: Vec<u32> },
    Disconnect { peer: usize },
    AddTrade,
    AddWitness,
    Inbound { from: usize, trade: bool },
}

fn arb_caps() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(prop_oneof![Just(0u32), Just(2u32), Just(99u32)], 0..3)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PEERS.len(), arb_caps()).prop_map(|(peer, caps)| Op::SetCapabilities { peer, caps }),
        (0..PEERS.len()).prop_map(|peer| Op::Disconnect { peer }),
        Just(Op::AddTrade),
        Just(Op::AddWitness),
        (0..PEERS.len(), any::<bool>()).prop_map(|(from, trade)| Op::Inbound { from, trade }),
    ]
}

fn to_set(ids: &[u32]) -> CapabilitySet {
    ids.iter().map(|&id| CapabilityId(id)).collect()
}

/// A distinct payload per step so every add is accepted.
fn payload(step: usize, trade: bool) -> Payload {
    if trade {
        btc_usd_trade(1, T0 + step as u64)
            .as_trade_statistics()
            .map(|t| {
                let mut t = t.clone();
                t.deposit_tx_id = format!("tx-{step}");
                Payload::from(t)
            })
            .unwrap()
    } else {
        witness((step % 250) as u8, step as u64)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `can_receive` is exactly set inclusion.
    #[test]
    fn can_receive_is_subset(caps in arb_caps(), trade in any::<bool>()) {
        let p = payload(0, trade);
        let set = to_set(&caps);
        let expected = p.required_capabilities().iter().all(|c| caps.contains(&c.0));
        prop_assert_eq!(can_receive(&p, &set), expected);
    }

    /// No payload ever reaches a peer that lacked a required capability
    /// when the payload was broadcast, whatever the interleaving of
    /// capability changes, disconnects and adds.
    #[test]
    fn never_sent_to_incapable_peer(ops in prop::collection::vec(arb_op(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let transport = RecordingTransport::new();
            let StoreChannels { handle, .. } = GossipStore::open(
                StoreConfig::default(),
                MemoryBackend::new(),
                Arc::new(transport.clone()),
                Arc::new(ManualClock::new(T0)),
            )
            .await
            .unwrap();

            let mut model: HashMap<PeerId, CapabilitySet> = HashMap::new();
            let mut checked = 0;

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::SetCapabilities { peer, caps } => {
                        let peer = PeerId::from(PEERS[peer]);
                        model.insert(peer.clone(), to_set(&caps));
                        handle.on_peer_capabilities_changed(peer, to_set(&caps));
                    }
                    Op::Disconnect { peer } => {
                        let peer = PeerId::from(PEERS[peer]);
                        model.remove(&peer);
                        handle.on_peer_disconnected(&peer);
                    }
                    Op::AddTrade => {
                        handle.add(payload(step, true));
                    }
                    Op::AddWitness => {
                        handle.add(payload(step, false));
                    }
                    Op::Inbound { from, trade } => {
                        let peer = PeerId::from(PEERS[from]);
                        let advertised = CapabilitySet::all_known();
                        model.entry(peer.clone()).or_insert_with(|| advertised.clone());
                        let bytes = wire::encode(&payload(step, trade)).unwrap();
                        handle.on_peer_message(&peer, &advertised, &bytes);
                    }
                }
                handle.flush().await.unwrap();

                let sent = transport.sent();
                for (peer, bytes) in &sent[checked..] {
                    let p = wire::decode(bytes).unwrap();
                    let caps = model.get(peer).cloned().unwrap_or_default();
                    assert!(
                        can_receive(&p, &caps),
                        "{peer} received {:?} with capabilities {caps:?}",
                        p.kind()
                    );
                }
                checked = sent.len();
            }
        });
    }
}

#[test]
fn unknown_capability_ids_never_satisfy_known_requirements() {
    let only_unknown = to_set(&[99, 1000]);
    assert!(!can_receive(&payload(0, true), &only_unknown));
    assert!(!can_receive(&payload(0, false), &only_unknown));
    assert!(can_receive(&payload(0, true), &to_set(&[TRADE_STATISTICS.0])));
    assert!(can_receive(&payload(0, false), &to_set(&[ACCOUNT_AGE_WITNESS.0])));
}
