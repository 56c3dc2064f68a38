pub mod batch;
pub mod catalog;
pub mod client;
pub mod error;
pub mod market;
pub mod normalize;
pub mod pagination;
pub mod retry;
pub mod session;
pub mod types;

pub use batch::{fetch_details_batched, BatchOptions, BatchOutcome, DetailSource};
pub use catalog::{CatalogResult, CategoryListing};
pub use client::graphql::{GraphQlClient, GraphQlClientConfig, GraphQlOperation};
pub use client::rest::RestClient;
pub use client::{ApiRequest, ClientSettings, EnvelopeKind, RequestClient};
pub use error::ScraperError;
pub use market::MarketClient;
pub use normalize::ProductPage;
pub use pagination::{collect_pages, CollectOptions, PageSource, PaginationState, Progress};
pub use retry::{retry, Cancelled, RecordingSleeper, RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};
pub use session::{acquire_session, SessionCredentials};
pub use tokio_util::sync::CancellationToken;
