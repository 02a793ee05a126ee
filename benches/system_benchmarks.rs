use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cpu_vitals::{
    calculate_usage, metrics::reader::parse_stat, CoreTimes, MetricsProvider, MonitorConfig,
    SystemCollector, SystemSnapshot, Topology,
};
use std::fs;
use tempfile::{tempdir, TempDir};

/// `/proc/stat` body for `cores` logical cores, advanced by `tick`.
fn stat_content(cores: u32, tick: u64) -> String {
    let line = |scale: u64| {
        format!(
            "{} 12 {} {} {} 3 9 0 0 0",
            1000 * scale + tick * 7,
            400 * scale + tick * 3,
            9000 * scale + tick * 20,
            50 * scale + tick
        )
    };
    let mut content = format!("cpu  {}\n", line(cores as u64));
    for id in 0..cores {
        content.push_str(&format!("cpu{} {}\n", id, line(1)));
    }
    content.push_str("intr 123456 0 9 0 0 0 0 0 0 1 0\nctxt 987654\nbtime 1700000000\n");
    content.push_str("processes 4242\nprocs_running 2\nprocs_blocked 0\n");
    content.push_str("softirq 55555 1 2 3 4 5 6 7 8 9 10\n");
    content
}

/// Synthetic root with `cores` logical cores.
fn machine(cores: u32) -> (TempDir, MonitorConfig) {
    let tmp = tempdir().expect("Should create temp dir");
    let config = MonitorConfig::with_root(tmp.path());
    fs::create_dir_all(tmp.path().join("proc")).expect("Should create proc dir");
    fs::write(&config.proc_stat_path, stat_content(cores, 0)).expect("Should write stat");
    fs::write(&config.meminfo_path, "MemTotal: 16000000 kB\nMemFree: 4000000 kB\nMemAvailable: 12000000 kB\n")
        .expect("Should write meminfo");
    for id in 0..cores {
        let dir = config.cpu_root.join(format!("cpu{}/cpufreq", id));
        fs::create_dir_all(&dir).expect("Should create cpu dir");
        fs::write(dir.join("scaling_cur_freq"), "2800000\n").expect("Should write frequency");
    }
    let hwmon = config.hwmon_root.join("hwmon0");
    fs::create_dir_all(&hwmon).expect("Should create hwmon dir");
    fs::write(hwmon.join("name"), "k10temp\n").expect("Should write sensor name");
    fs::write(hwmon.join("temp1_input"), "61250\n").expect("Should write sensor value");
    (tmp, config)
}

/// Benchmark the delta computation for one slot
fn bench_calculate_usage(c: &mut Criterion) {
    let previous = CoreTimes {
        user: 100_000,
        nice: 120,
        system: 40_000,
        idle: 900_000,
        iowait: 5_000,
        irq: 30,
        softirq: 90,
        ..Default::default()
    };
    let current = CoreTimes {
        user: 100_070,
        system: 40_030,
        idle: 900_200,
        iowait: 5_010,
        ..previous
    };

    c.bench_function("calculate_usage", |b| {
        b.iter(|| calculate_usage(black_box(&previous), black_box(&current)))
    });
}

/// Benchmark parsing the time-counter source for growing core counts
fn bench_parse_stat(c: &mut Criterion) {
    for cores in [4u32, 16, 64, 256] {
        let tmp = tempdir().expect("Should create temp dir");
        for id in 0..cores {
            fs::create_dir(tmp.path().join(format!("cpu{}", id))).expect("Should create cpu dir");
        }
        let topology = Topology::scan(tmp.path()).expect("Should scan topology");
        let content = stat_content(cores, 1);

        c.bench_with_input(BenchmarkId::new("parse_stat", cores), &content, |b, content| {
            b.iter(|| parse_stat(black_box(content), &topology))
        });
    }
}

/// Benchmark a full poll tick against a synthetic tree
fn bench_poll(c: &mut Criterion) {
    for cores in [4u32, 32] {
        let (_tmp, config) = machine(cores);
        let mut collector = SystemCollector::new(&config).expect("Should create collector");
        collector.poll();

        c.bench_with_input(BenchmarkId::new("poll", cores), &cores, |b, _| {
            b.iter(|| collector.poll())
        });
    }
}

/// Benchmark JSON serialization of system snapshots
fn bench_json_serialization(c: &mut Criterion) {
    let (_tmp, config) = machine(16);
    let mut collector = SystemCollector::new(&config).expect("Should create collector");
    collector.poll();
    fs::write(&config.proc_stat_path, stat_content(16, 1)).expect("Should write stat");
    let snapshot = collector.poll();

    c.bench_function("json_serialization", |b| {
        b.iter(|| serde_json::to_string(&snapshot).expect("Should serialize"))
    });

    let json_string = serde_json::to_string(&snapshot).expect("Should serialize");
    c.bench_function("json_deserialization", |b| {
        b.iter(|| serde_json::from_str::<SystemSnapshot>(&json_string).expect("Should deserialize"))
    });
}

criterion_group!(
    benches,
    bench_calculate_usage,
    bench_parse_stat,
    bench_poll,
    bench_json_serialization
);
criterion_main!(benches);
