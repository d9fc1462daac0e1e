// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the localisation problem:
// what a training crop is, which head is being trained, and
// which errors the rest of the system can raise.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §6 (Enums), §10 (Traits)

// A single annotated image crop as supplied by a data source
pub mod crop;

// The two trainable heads of the network
pub mod head;

// Error kinds shared by the core
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
