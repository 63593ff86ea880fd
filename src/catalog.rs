//! The catalog page: fetched records, unified items and the mutation
//! coordinator that keeps them in sync with the store.

use crate::analytics::{AnalyticsReport, AnalyticsSettings};
use crate::model::{Item, Seller, Status};
use crate::mutation::{CatalogState, Coordinator, Notice};
use crate::query::{PageView, QueryState};
use crate::store::CatalogStore;
use crate::unify::unify;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    mutations: Coordinator,
    sellers: Vec<Seller>,
    loaded_at: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            mutations: Coordinator::new(store.clone(), CatalogState::default()),
            store,
            sellers: Vec::new(),
            loaded_at: None,
        }
    }

    /// Fetch articles, lots and sellers together and rebuild the unified list.
    /// On failure the last-known items stay visible and a notice is raised.
    #[instrument(skip_all)]
    pub async fn refresh(&mut self) -> Result<()> {
        let fetched = tokio::try_join!(
            self.store.fetch_articles(),
            self.store.fetch_lots(),
            self.store.fetch_sellers(),
        );
        match fetched {
            Ok((articles, lots, sellers)) => {
                let items = unify(&articles, &lots);
                info!(
                    articles = articles.len(),
                    lots = lots.len(),
                    sellers = sellers.len(),
                    "catalog loaded"
                );
                self.mutations.state_mut().replace_items(items);
                self.sellers = sellers;
                self.loaded_at = Some(Utc::now());
                Ok(())
            }
            Err(err) => {
                warn!(?err, "catalog fetch failed; keeping last-known items");
                self.mutations
                    .state_mut()
                    .notify(Notice::error(format!("Chargement impossible : {err}")));
                Err(err)
            }
        }
    }

    pub fn items(&self) -> &[Item] {
        self.mutations.state().items()
    }

    pub fn sellers(&self) -> &[Seller] {
        &self.sellers
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn default_seller(&self) -> Option<&Seller> {
        self.sellers.iter().find(|s| s.is_default)
    }

    pub fn seller_name(&self, seller_id: &str) -> Option<&str> {
        self.sellers
            .iter()
            .find(|s| s.id == seller_id)
            .map(|s| s.name.as_str())
    }

    /// Items waiting to be published.
    pub fn ready_items(&self) -> Vec<&Item> {
        self.items()
            .iter()
            .filter(|i| i.status == Status::Ready)
            .collect()
    }

    pub fn query(&self, query: &QueryState) -> PageView<'_> {
        query.run(self.items())
    }

    pub fn analytics(
        &self,
        settings: AnalyticsSettings,
        now: DateTime<Utc>,
    ) -> AnalyticsReport<'_> {
        AnalyticsReport::build(self.items(), &self.sellers, settings, now)
    }

    pub fn mutations(&mut self) -> &mut Coordinator {
        &mut self.mutations
    }

    pub fn notices(&self) -> &[Notice] {
        self.mutations.state().notices()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.mutations.state_mut().drain_notices()
    }

    /// Create a seller and make it visible without a full refresh.
    pub async fn add_seller(&mut self, name: &str) -> Result<Seller> {
        let seller = self.store.insert_seller(name).await?;
        self.sellers.push(seller.clone());
        Ok(seller)
    }

    pub async fn set_default_seller(&mut self, seller_id: &str) -> Result<()> {
        self.store.set_default_seller(seller_id).await?;
        for s in &mut self.sellers {
            s.is_default = s.id == seller_id;
        }
        Ok(())
    }
}
