use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use radio_sim::protocol::merge_sort_with;
use radio_sim::util::init_tracing;
use radio_sim::{Config, Correction, MergeStrategy, Network, Word};
use tracing::Level;

fn main() {
    init_tracing(Level::INFO);

    let n = 64;
    let mut rng = StdRng::seed_from_u64(2024);
    let keys: Vec<Word> = (0..n).map(|_| rng.gen_range(0..10_000)).collect();

    println!("Sorting {} random keys on a single-hop radio network", n);
    for strategy in [
        MergeStrategy::Tournament,
        MergeStrategy::Regrouped,
        MergeStrategy::Iterated,
    ] {
        let mut network = match Network::new(Config::with_stations(n).strategy(strategy)) {
            Ok(network) => network,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return;
            }
        };
        let ids = network.physical_ids();
        if let Err(e) = network
            .seed_keys(&ids, &keys)
            .and_then(|_| merge_sort_with(&mut network, &ids, strategy))
        {
            eprintln!("{:?} merge sort failed: {}", strategy, e);
            continue;
        }

        let report = network.report();
        println!("\n{:?}:", strategy);
        println!("- Slots: {} ({} busy)", report.clock, report.busy_slots);
        println!("- Max sends per station: {}", report.max_sends);
        println!("- Max listens per station: {}", report.max_listens);
        println!("- Max energy per station: {}", report.max_energy);
    }

    // Change a few keys of a sorted sequence and repair it
    let mut network = match Network::with_stations(n) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return;
        }
    };
    let ids = network.physical_ids();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    for (position, id) in ids.iter().enumerate() {
        let regs = &mut network[*id].regs;
        regs.old_index = position as Word;
        regs.old_key = sorted[position];
        regs.new_key = sorted[position];
    }
    for id in ids.iter().step_by(9) {
        network[*id].regs.new_key = rng.gen_range(0..10_000);
    }

    let mut correction = Correction::new();
    match correction.run(&mut network, &ids) {
        Ok(summary) => {
            println!("\nCorrection:");
            println!("- Changed keys: {}", summary.changed);
            println!("- Workers per changed key: {}", summary.team_size);
            println!("- Slots: {}", summary.slots);
            println!("- Max energy per station: {}", network.report().max_energy);
        }
        Err(e) => eprintln!("Correction failed: {}", e),
    }
}
