use clap::Parser;
use robin_heap::BidiMap;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'l', long = "load_factor", default_value_t = robin_heap::DEFAULT_LOAD_FACTOR)]
    load_factor: f64,

    /// Remove every n-th pair after filling, to show tombstones.
    #[arg(short = 'r', long = "remove_every", default_value_t = 0)]
    remove_every: u64,
}

fn main() -> Result<(), robin_heap::Error> {
    let args = Args::parse();

    println!(
        "Creating BidiMap with target capacity {} at load factor {}",
        args.target_capacity, args.load_factor
    );

    let mut map: BidiMap<u64, String> =
        BidiMap::with_load_factor(args.target_capacity, args.load_factor)?;

    println!("Slots per table: {}", map.capacity());
    println!("Filling map up to its load factor...");

    let mut next = 0u64;
    while !map.is_full() {
        map.insert(next, format!("value_{next:08}"))?;
        next += 1;
    }

    if args.remove_every > 0 {
        for key in (0..next).step_by(args.remove_every as usize) {
            map.remove_by_key(&key)?;
        }
    }

    println!("Pairs in map: {}", map.len());
    println!(
        "Final load factor: {:.2}%",
        (map.len() as f64 / map.capacity() as f64) * 100.0
    );

    let (keys, values) = map.probe_stats();
    println!();
    println!("Key table:");
    keys.print();
    println!();
    println!("Value table:");
    values.print();

    Ok(())
}
