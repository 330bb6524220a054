//! Time-boxed CAPTCHA challenge store.
//!
//! Challenges are held in an explicit keyed store with a TTL instead of
//! process-global state: each entry is issued with an expiry, verification
//! consumes the entry (single use), and expired entries are swept on every
//! issue. In a multi-instance deployment the store can be swapped for an
//! external cache behind the same interface.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

/// Characters a challenge answer is drawn from.
const ANSWER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a challenge answer.
const ANSWER_LEN: usize = 4;

/// Default challenge lifetime in minutes.
pub const DEFAULT_TTL_MINUTES: i64 = 5;

/// A newly issued challenge.
///
/// The `answer` is for the issuer's bookkeeping and must never be sent to
/// the client; the client gets `id` and `image` only.
#[derive(Debug, Clone)]
pub struct IssuedCaptcha {
    /// Opaque challenge identifier returned to the client.
    pub id: Uuid,
    /// Expected answer, uppercase.
    pub answer: String,
    /// Inline `data:image/svg+xml;base64,` URI for an `<img>` tag.
    pub image: String,
}

/// Result of verifying a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaVerification {
    /// The answer matched.
    Passed,
    /// The answer did not match; the challenge is consumed anyway.
    Mismatch,
    /// The challenge had already expired.
    Expired,
    /// No challenge with that id exists (never issued, already used, or
    /// swept).
    NotFound,
}

impl CaptchaVerification {
    /// Whether the submission should be accepted.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug)]
struct Challenge {
    answer: String,
    expires_at: DateTime<Utc>,
}

/// Expiring store of outstanding CAPTCHA challenges.
#[derive(Debug)]
pub struct CaptchaStore {
    ttl: Duration,
    challenges: Mutex<HashMap<Uuid, Challenge>>,
}

impl Default for CaptchaStore {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_TTL_MINUTES))
    }
}

impl CaptchaStore {
    /// Creates a store whose challenges live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            challenges: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a new challenge, sweeping expired entries first.
    pub fn issue(&self, now: DateTime<Utc>) -> IssuedCaptcha {
        let answer = random_answer();
        let image = render_svg_data_uri(&answer);
        let id = Uuid::new_v4();

        if let Ok(mut challenges) = self.challenges.lock() {
            challenges.retain(|_, c| c.expires_at > now);
            challenges.insert(
                id,
                Challenge {
                    answer: answer.clone(),
                    expires_at: now + self.ttl,
                },
            );
        }

        IssuedCaptcha { id, answer, image }
    }

    /// Verifies a submitted answer, consuming the challenge.
    ///
    /// Matching is case-insensitive. Whatever the result, the challenge
    /// cannot be retried.
    pub fn verify(&self, id: Uuid, input: &str, now: DateTime<Utc>) -> CaptchaVerification {
        let Ok(mut challenges) = self.challenges.lock() else {
            return CaptchaVerification::NotFound;
        };
        let Some(challenge) = challenges.remove(&id) else {
            return CaptchaVerification::NotFound;
        };

        if challenge.expires_at <= now {
            return CaptchaVerification::Expired;
        }

        if challenge.answer.eq_ignore_ascii_case(input.trim()) {
            CaptchaVerification::Passed
        } else {
            CaptchaVerification::Mismatch
        }
    }

    /// Removes expired challenges and returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.challenges.lock().map_or(0, |mut challenges| {
            let before = challenges.len();
            challenges.retain(|_, c| c.expires_at > now);
            before - challenges.len()
        })
    }

    /// Number of live entries (including not-yet-swept expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.lock().map_or(0, |c| c.len())
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Draws a random `ANSWER_LEN`-character answer.
fn random_answer() -> String {
    let mut rng = rand::thread_rng();
    (0..ANSWER_LEN)
        .map(|_| char::from(ANSWER_CHARSET[rng.gen_range(0..ANSWER_CHARSET.len())]))
        .collect()
}

/// Renders the answer text as a distorted SVG and wraps it in a data URI.
fn render_svg_data_uri(answer: &str) -> String {
    const WIDTH: i32 = 120;
    const HEIGHT: i32 = 40;

    let mut rng = rand::thread_rng();
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}"><rect width="100%" height="100%" fill="white"/>"#
    );

    // Interference lines behind the text.
    for _ in 0..5 {
        let (x1, y1) = (rng.gen_range(0..WIDTH), rng.gen_range(0..HEIGHT));
        let (x2, y2) = (rng.gen_range(0..WIDTH), rng.gen_range(0..HEIGHT));
        svg.push_str(&format!(
            r#"<line x1="{x1}" y1="{y1}" x2="{x2}" y2="{y2}" stroke="gray" stroke-width="1"/>"#
        ));
    }

    // Per-character jitter and random dark colors.
    let step = WIDTH / i32::try_from(answer.len().max(1)).unwrap_or(1);
    for (i, ch) in answer.chars().enumerate() {
        let x = step / 2 + step * i32::try_from(i).unwrap_or(0) + rng.gen_range(-3..=3);
        let y = HEIGHT / 2 + 7 + rng.gen_range(-3..=3);
        let rotate = rng.gen_range(-15..=15);
        let (r, g, b) = (
            rng.gen_range(0..100),
            rng.gen_range(0..100),
            rng.gen_range(0..100),
        );
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="monospace" font-size="22" fill="rgb({r},{g},{b})" transform="rotate({rotate} {x} {y})">{ch}</text>"#
        ));
    }

    // Noise points.
    for _ in 0..50 {
        let (x, y) = (rng.gen_range(0..WIDTH), rng.gen_range(0..HEIGHT));
        svg.push_str(&format!(r#"<circle cx="{x}" cy="{y}" r="0.5" fill="gray"/>"#));
    }

    svg.push_str("</svg>");

    format!("data:image/svg+xml;base64,{}", BASE64.encode(svg.as_bytes()))
}
