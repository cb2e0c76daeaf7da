use tabled::Tabled;

#[derive(Tabled)]
pub struct RequestRow {
    pub name: String,
    pub total_requests: usize,
    #[tabled(display = "float2")]
    pub avg_time_ms: f64,
    #[tabled(display = "float2")]
    pub min_time_ms: f64,
    #[tabled(display = "float2")]
    pub p95_time_ms: f64,
    #[tabled(display = "float2")]
    pub max_time_ms: f64,
    #[tabled(display = "percent")]
    pub failed: f64,
}

#[derive(Tabled)]
pub struct MetricRow {
    pub metric: String,
    pub kind: String,
    pub values: String,
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub metric: String,
    pub threshold: String,
    pub measured: String,
    pub status: String,
}

fn float2(n: &f64) -> String {
    format!("{n:.2}")
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}
