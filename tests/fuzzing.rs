// only run this test if the "fuzzing" feature is enabled
// this test takes very long to run so we don't want it be run by Github CI
// we only manually run it:
// $ cargo test --features fuzzing --test fuzzing -- --nocapture
#![cfg(feature = "fuzzing")]

//! Our fuzz testing strategy is as follows:
//!
//! - Apply a long sequence of random `put`/`delete`/`get` commands to two
//!   independently constructed [`State`] instances, fed the exact same
//!   command stream, and assert their snapshots stay byte-identical after
//!   every batch (I4: deterministic replay).
//!
//! - At the end of every batch, also take a snapshot/restore round trip on
//!   one of the replicas and check the re-encoded bytes match (I3).
//!
//! - Puts draw 70% of the time from paths already seen (so intermediaries
//!   get revisited and re-versioned) and 30% of the time from brand new
//!   paths; deletes draw from paths already seen (most of which are already
//!   gone, exercising the "already removed" no-op branch) and occasionally
//!   from paths that never existed.

use {
    khepri_tree::{
        command::{Command, DeleteCommand, GetCommand, PutCommand},
        config::Config,
        matcher::MatchOptions,
        snapshot,
        state::State,
        types::{NodeId, PatternComponent, Payload},
    },
    rand::Rng,
    random_string::{charsets::ALPHANUMERIC, generate},
    std::fs,
};

const BATCH_COUNT: usize = 100;
const OPS_PER_BATCH: usize = 90;

#[test]
fn fuzzing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut rng = rand::thread_rng();
    let mut replica_one = State::new(Config::default());
    let mut replica_two = State::new(Config::default());
    let mut known_paths: Vec<Vec<String>> = Vec::new();
    let mut applied = Vec::new();

    for batch_index in 1..=BATCH_COUNT {
        let batch = generate_batch(&mut known_paths, &mut rng);
        for command in &batch {
            replica_one.apply(command);
            replica_two.apply(command);
        }
        applied.extend(batch);

        if let Err(err) = check(&replica_one, &replica_two, batch_index) {
            let commands_json = serde_json::to_vec_pretty(&applied).unwrap();
            let _ = fs::create_dir_all("testdata");
            fs::write("testdata/commands.json", commands_json).unwrap();
            panic!("{err}");
        }
    }
}

fn rand_component<R: Rng>(rng: &mut R) -> String {
    generate(rng.gen_range(1..=12), ALPHANUMERIC)
}

fn rand_payload<R: Rng>(rng: &mut R) -> Payload {
    Payload::data(generate(rng.gen_range(0..=20), ALPHANUMERIC).into_bytes())
}

fn rand_known_path<'a, R: Rng>(known: &'a [Vec<String>], rng: &mut R) -> &'a [String] {
    &known[rng.gen_range(0..known.len())]
}

fn literal_pattern(components: &[String]) -> Vec<PatternComponent> {
    components.iter().map(|s| PatternComponent::Id(NodeId::atom(s.clone()))).collect()
}

fn generate_batch<R: Rng>(known_paths: &mut Vec<Vec<String>>, rng: &mut R) -> Vec<Command> {
    let mut batch = Vec::with_capacity(OPS_PER_BATCH);

    for _ in 0..OPS_PER_BATCH {
        let roll = rng.gen_range(0..100);
        if roll < 60 {
            // put: 60% of the time revisit a known path, else mint a new one.
            let components = if !known_paths.is_empty() && rng.gen_bool(0.7) {
                rand_known_path(known_paths, rng).to_vec()
            } else {
                let depth = rng.gen_range(1..=3);
                let components: Vec<String> = (0..depth).map(|_| rand_component(rng)).collect();
                known_paths.push(components.clone());
                components
            };
            batch.push(Command::Put(PutCommand {
                pattern: literal_pattern(&components),
                payload: if rng.gen_bool(0.1) { None } else { Some(rand_payload(rng)) },
                keep_while: None,
            }));
        } else if roll < 90 {
            // delete: mostly from known paths (often already gone), sometimes
            // from a path that was never created (a guaranteed no-op).
            let components = if !known_paths.is_empty() && rng.gen_bool(0.8) {
                rand_known_path(known_paths, rng).to_vec()
            } else {
                vec![rand_component(rng)]
            };
            batch.push(Command::Delete(DeleteCommand { pattern: literal_pattern(&components) }));
        } else {
            // get: a pure read, included so I5 (purity) is exercised
            // alongside the mutating commands.
            let components = if !known_paths.is_empty() {
                rand_known_path(known_paths, rng).to_vec()
            } else {
                vec![rand_component(rng)]
            };
            batch.push(Command::Get(GetCommand {
                pattern: literal_pattern(&components),
                options: MatchOptions::default(),
            }));
        }
    }

    batch
}

/// After every batch: the two replicas must hold byte-identical snapshots
/// (I4), and a snapshot/restore round trip on one of them must reproduce
/// the exact same bytes (I3).
fn check(replica_one: &State, replica_two: &State, batch_index: usize) -> Result<(), String> {
    let snapshot_one = snapshot::encode(replica_one);
    let snapshot_two = snapshot::encode(replica_two);
    if snapshot_one != snapshot_two {
        return Err(format!("batch {batch_index}: replicas diverged after applying the same commands"));
    }

    let restored = snapshot::decode(&snapshot_one, Config::default())
        .map_err(|err| format!("batch {batch_index}: snapshot failed to decode: {err}"))?;
    let round_tripped = snapshot::encode(&restored);
    if round_tripped != snapshot_one {
        return Err(format!("batch {batch_index}: snapshot/restore round trip changed the bytes"));
    }

    println!("batch {batch_index}, snapshot size = {} bytes, root = {:?}", snapshot_one.len(), replica_one.root().payload_version);

    // Sanity-check the tree's own counter invariant on the decoded copy too,
    // since decode_node reconstructs `child_list_count` from the wire bytes
    // rather than recomputing it.
    let mut stack = vec![restored.root()];
    while let Some(node) = stack.pop() {
        if node.child_list_count != node.children.len() as u64 {
            return Err(format!("batch {batch_index}: child_list_count mismatch after restore"));
        }
        stack.extend(node.children.iter().map(|(_, child)| child));
    }

    Ok(())
}
