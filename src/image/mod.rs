//! Image and repository naming
//!
//! This module provides the reference types the rest of the crate passes around
//! ([`RepositoryRef`], [`TargetRepositoryRef`], [`ImageRef`]) and the [`MirrorListParser`]
//! that turns the mirror list into [`MirrorEntry`] values.
//!
//! # Examples
//!
//! ```
//! use docker_image_mirror::image::{MirrorListParser, Repository};
//!
//! let list = MirrorListParser::default().parse_str("redis:7.0,7.2\n# comment\n");
//! let entry = &list.entries[0];
//! assert_eq!(entry.repository.path(), "library/redis");
//! assert_eq!(entry.repository.target("me").path(), "me/library_redis");
//! ```

pub mod parser;
pub mod reference;

pub use parser::{DEFAULT_NAMESPACE, MirrorEntry, MirrorList, MirrorListParser, RejectedLine};
pub use reference::{ImageRef, Repository, RepositoryRef, TargetRepositoryRef};
