//! Default values for the controller's closed configuration surface (§6).
//!
//! Every knob listed here has a sane default so a `Config` can be built with
//! nothing but the master key material and still behave correctly.

use std::time::Duration;

/// Literal magic bytes prefixing every credential envelope, `SKCv`.
pub const ENVELOPE_MAGIC: [u8; 4] = [0x53, 0x4B, 0x43, 0x76];

/// AES-256-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Default per-call deadline for synchronous reads (`list`, `get`, `regions`, ...).
pub const DEFAULT_DISPATCH_DEADLINE: Duration = Duration::from_secs(60);

/// Default deadline for a mutating long-running operation.
pub const DEFAULT_OPERATION_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Default per-credential in-flight call cap enforced by the Dispatcher bulkhead.
pub const DEFAULT_PER_CREDENTIAL_INFLIGHT_CAP: usize = 16;

/// Default wait for a bulkhead admission slot before failing with `ErrUnavailable`.
pub const DEFAULT_BULKHEAD_QUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of the Event Bus's global ring buffer.
pub const DEFAULT_BUS_RING_CAPACITY: usize = 4096;

/// Default capacity of each subscriber's bounded delivery queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Default retention window for terminal operations before eviction.
pub const DEFAULT_OPERATION_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default SSE keepalive comment interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default synthesized-progress heartbeat interval when a provider offers no
/// native progress signal.
pub const DEFAULT_PROGRESS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Synthesized progress never exceeds this percentage before a terminal event arrives.
pub const SYNTHESIZED_PROGRESS_CAP: u8 = 95;

/// Default retry backoff base delay for `ErrUnavailable`.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);

/// Default retry backoff multiplicative factor.
pub const DEFAULT_RETRY_FACTOR: f64 = 2.0;

/// Default retry jitter, expressed as a fraction applied symmetrically (±25%).
pub const DEFAULT_RETRY_JITTER: f64 = 0.25;

/// Default retry backoff cap.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default maximum dispatch attempts (including the first).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// TTL for the Dispatcher's negative cache of recently-failed
/// (credential, op_kind) pairs.
pub const DEFAULT_NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(5);
