use std::sync::Arc;

use db::DBService;
use services::services::{
    account_link::AccountLinkService,
    auth::AuthService,
    catalog::CatalogService,
    config::Config,
    judge_api::{JudgeApiClient, JudgeGateway},
    records::RecordsService,
};

/// Shared handles for every route handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub links: AccountLinkService,
    pub catalog: CatalogService,
    pub records: RecordsService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let db = DBService::new(&config.database_url).await?;
        let auth = AuthService::new(config.clone())?;

        let gateway: Arc<dyn JudgeGateway> =
            Arc::new(JudgeApiClient::new(config.judge_api_base_url.clone())?);
        let catalog = CatalogService::new(gateway.clone());

        Ok(Self {
            db,
            config,
            auth,
            links: AccountLinkService::new(gateway),
            records: RecordsService::new(catalog.clone()),
            catalog,
        })
    }
}
