//! `riddlefish-perception` – who is standing in front of the fish.
//!
//! Turns a camera stream into a debounced stream of
//! [`PresenceEvent`][riddlefish_types::PresenceEvent]s.
//!
//! # Modules
//!
//! - [`analyzer`] – the [`FaceAnalyzer`][analyzer::FaceAnalyzer] and
//!   [`AttributeClassifier`][analyzer::AttributeClassifier] seams behind
//!   which the detection models live.
//! - [`registry`] – [`IdentityRegistry`][registry::IdentityRegistry]:
//!   first-match lookup of a face encoding against known visitors.
//! - [`debounce`] – [`DepartureDebounce`][debounce::DepartureDebounce]:
//!   turns "no face this frame" into a single sustained-absence signal.
//! - [`tracker`] – [`PresenceTracker`][tracker::PresenceTracker]: the worker
//!   thread tying camera, models, registry and identity store together.
//! - [`sim`] – scripted models for headless runs.

pub mod analyzer;
pub mod debounce;
pub mod registry;
pub mod sim;
pub mod tracker;
