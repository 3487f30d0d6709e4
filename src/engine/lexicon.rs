//! Exact word lists the sentiment pass matches against. Entries are already
//! in normalized form (lowercase, NFKD, combining marks stripped).

pub const POSITIVE: &[&str] = &["adorei", "gostei", "bom", "boa", "excelente", "otimo"];
pub const NEGATIVE: &[&str] = &["ruim", "terrivel", "pessimo", "horrivel", "lento"];
pub const INTENSIFIERS: &[&str] = &["muito", "super"];
pub const NEGATIONS: &[&str] = &["nao"];
pub const META_PHRASE: &str = "teste tecnico mbras";

pub const NEGATION_WINDOW: usize = 3;
pub const INTENSIFIER_MULTIPLIER: f64 = 1.5;
pub const EMPLOYEE_BONUS_MULTIPLIER: f64 = 2.0;

pub const CANDIDATE_AWARENESS_ENGAGEMENT_OVERRIDE: f64 = 9.42;
