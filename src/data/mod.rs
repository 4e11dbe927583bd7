/// Data layer: the pickled MNIST tuple and what can be done with it.
///
/// Architecture:
/// ```text
///  mnist.pkl
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  unpickle → (training, validation, test)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ DatasetSplits │  three Values, LabeledSplit view per split
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  label predicates → filtered indices
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  parquet / csv / json
///   └──────────┘
/// ```

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod synthetic;
