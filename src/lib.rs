//! Cross-domain collaborative filtering for positive-only feedback.
//!
//! Auxiliary preferences from a *source* domain are fused into the latent
//! factors of a *target* domain, either through pairwise item similarities
//! ([`SimMf`]) or through neighbor-distance regularization ([`NeighborMf`]).
//! Both build on a fast RR1-based implicit-feedback ALS ([`FastMf`]); the
//! exact-solve baseline ([`ImplicitMf`]) and Jaccard kNN recommenders are
//! included for comparison.

mod error;
mod fast_mf;
mod implicit_mf;
mod index;
mod item_knn;
pub mod matrix;
mod mf;
mod neighbor_mf;
mod neighborhoods;
mod partition;
mod preferences;
mod recommender;
mod sim_mf;
mod similarity;
mod user_knn;

pub use error::{Error, Result};
pub use fast_mf::FastMf;
pub use implicit_mf::ImplicitMf;
pub use index::{stable_set, Index, StableMap, StableSet};
pub use item_knn::ItemKnn;
pub use matrix::RAND_SEED;
pub use mf::{FactorModel, MfHyperParams};
pub use neighbor_mf::NeighborMf;
pub use neighborhoods::ItemNeighborhoods;
pub use partition::DomainPartition;
pub use preferences::PreferenceData;
pub use recommender::{Recommender, ScoredItem};
pub use sim_mf::SimMf;
pub use similarity::{FileSimilarity, Jaccard, Similarity};
pub use user_knn::UserKnn;
