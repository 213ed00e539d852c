use engine_core::metrics::MetricsSnapshot;

pub fn print_summary(snapshot: &MetricsSnapshot) {
    println!("Load summary:");
    println!("-----------------------------");
    println!("{:<20} {}", "Rows loaded", snapshot.good);
    println!("{:<20} {}", "Bad rows", snapshot.bad);
    println!("{:<20} {}", "Batches", snapshot.batches);
    println!("{:<20} {}", "Channel swaps", snapshot.swaps);
    println!("{:<20} {}", "Write retries", snapshot.retries);
    println!("{:<20} {}", "Schema evolutions", snapshot.schema_evolutions);
    println!("{:<20} {} ms", "Last latency", snapshot.latency_millis);
}
