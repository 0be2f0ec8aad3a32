use kpal_core::{Filter, FilterAttribute, Resource};
use kpal_search::{rank, FilterSet};
use std::time::Instant;

const KINDS: [&str; 4] = ["Pod", "Service", "Deployment", "ConfigMap"];

fn gen_items(n: usize) -> Vec<Resource> {
    (0..n)
        .map(|i| {
            let kind = KINDS[i % KINDS.len()];
            let ns = format!("ns{}", i % 10);
            let app = match i % 3 {
                0 => "web",
                1 => "api",
                _ => "batch",
            };
            Resource::new(kind, format!("{app}-{i:06}"), Some(&ns))
        })
        .collect()
}

fn percentile_us(xs: &mut [u128], p: f64) -> u128 {
    xs.sort_unstable();
    let idx = ((xs.len() as f64 - 1.0) * p).round() as usize;
    xs[idx]
}

fn main() {
    let n: usize = std::env::var("KPAL_BENCH_DOCS").ok().and_then(|s| s.parse().ok()).unwrap_or(20_000);

    eprintln!("generating {} resources", n);
    let t0 = Instant::now();
    let items = gen_items(n);
    let gen_ms = t0.elapsed().as_secs_f64() * 1_000.0;

    let substring: Vec<String> = (0..50).map(|i| format!("web-{:03}", i)).collect();
    let multi: Vec<String> = (0..10).map(|i| format!("api ns{}", i)).collect();
    let fuzzy: Vec<String> = vec!["wb0".into(), "dplw".into(), "cfgmp".into(), "srvapi".into()];

    let mut filters = FilterSet::new();
    filters.add(Filter::new(FilterAttribute::Kind, "Pod"));

    let run = |label: &str, qs: &[String], filters: &FilterSet| {
        let mut times: Vec<u128> = Vec::with_capacity(qs.len());
        for q in qs {
            let t = Instant::now();
            let visible: Vec<&Resource> = filters.apply(&items);
            let _ = rank(&visible, q);
            times.push(t.elapsed().as_micros());
        }
        let p50 = percentile_us(&mut times.clone(), 0.50) as f64 / 1000.0;
        let p99 = percentile_us(&mut times, 0.99) as f64 / 1000.0;
        println!("{}: p50={:.3}ms p99={:.3}ms ({} queries, filters={})", label, p50, p99, qs.len(), filters.len());
    };

    println!("generate: {:.1}ms docs={}", gen_ms, n);
    let none = FilterSet::new();
    run("substring", &substring, &none);
    run("multi-term", &multi, &none);
    run("fuzzy", &fuzzy, &none);
    run("substring+kind", &substring, &filters);
}
