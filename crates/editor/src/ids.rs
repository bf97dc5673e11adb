use chrono::Utc;
use rand::Rng;

const SUFFIX_LEN: usize = 6;

/// Generates `<prefix>-<unix millis>-<base36 suffix>`, redrawing the suffix
/// until `taken` reports no collision.
pub fn generate_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
            .collect();
        let id = format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix);
        if !taken(&id) {
            return id;
        }
    }
}
