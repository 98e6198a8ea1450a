pub mod models;

pub use models::{CachingTenantDirectory, PgTenantDirectory, Tenant, TenantDirectory};
