pub mod bins;
pub mod histogram;
pub mod locator;
pub mod cleaner;
pub mod stencil;
pub mod resolver;
pub mod oracle;

pub use bins::{BinTable, BIN_COUNT};
pub use histogram::Histogram;
pub use locator::{ChainTip, DayBlockLocator};
pub use cleaner::HistogramCleaner;
pub use stencil::{SlideMatch, StencilMatcher, Stencils};
pub use resolver::{PriceCandidate, PriceResolver, ResolvedPrice};
pub use oracle::{ChainStatus, PriceEstimate, PriceOracle};
