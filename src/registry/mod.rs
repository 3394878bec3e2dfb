//! Registry module for Docker Hub interactions
//!
//! This module provides the [`RegistryMetadata`] interface the sync engine consumes, its
//! Docker Hub implementation [`HubClient`], and session login via [`Auth`].

pub mod auth;
pub mod client;
pub mod metadata;

pub use auth::Auth;
pub use client::{DEFAULT_HUB_URL, HubClient, HubClientBuilder};
pub use metadata::{Description, DescriptionUpdate, RegistryMetadata};
