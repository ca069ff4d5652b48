//! Transitive dependency resolution.
//!
//! Formula metadata is fetched concurrently into a shared map (placeholder
//! inserted before the fetch so shared dependencies are only fetched once),
//! then a post-order walk turns the map into a topologically sorted plan
//! with the root last.

use crate::domain::{Formula, ResolvedPackage};
use crate::error::{ChatrError, Result};
use crate::traits::{Registry, State};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

type FetchedMap = Arc<Mutex<HashMap<String, Option<Formula>>>>;

#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn Registry>,
    state: Arc<dyn State>,
}

impl Resolver {
    pub fn new(registry: Arc<dyn Registry>, state: Arc<dyn State>) -> Self {
        Self { registry, state }
    }

    /// Produce the install plan for `name`: one entry per distinct package,
    /// every dependency before its dependents, the root last.
    pub async fn resolve(&self, name: &str) -> Result<Vec<ResolvedPackage>> {
        let fetched: FetchedMap = Arc::new(Mutex::new(HashMap::new()));
        self.fetch_all(name.to_string(), fetched.clone()).await?;

        let fetched = fetched.lock().await;
        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        self.build(name, false, &fetched, &mut visited, &mut in_progress, &mut plan)?;

        Ok(plan)
    }

    fn fetch_all(&self, name: String, fetched: FetchedMap) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        async move {
            {
                let mut map = fetched.lock().await;
                if map.contains_key(&name) {
                    return Ok(());
                }
                // Placeholder first so concurrent siblings dedupe on it.
                map.insert(name.clone(), None);
            }

            let formula = this.registry.get(&name).await.map_err(|e| ChatrError::Resolve {
                name: name.clone(),
                source: Box::new(e),
            })?;
            let deps = formula.dependencies.clone();
            fetched.lock().await.insert(name.clone(), Some(formula));

            let mut tasks = JoinSet::new();
            for dep in deps {
                let this = this.clone();
                let fetched = fetched.clone();
                tasks.spawn(async move { this.fetch_all(dep, fetched).await });
            }

            // First error wins; dropping the set aborts the siblings.
            while let Some(joined) = tasks.join_next().await {
                joined.map_err(|e| anyhow::anyhow!("resolver task failed: {e}"))??;
            }
            Ok(())
        }
        .boxed()
    }

    fn build(
        &self,
        name: &str,
        is_dep: bool,
        fetched: &HashMap<String, Option<Formula>>,
        visited: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        plan: &mut Vec<ResolvedPackage>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if !in_progress.insert(name.to_string()) {
            return Err(ChatrError::Cycle(name.to_string()));
        }

        let formula = fetched
            .get(name)
            .and_then(|f| f.clone())
            .ok_or_else(|| ChatrError::NotFound(name.to_string()))?;

        for dep in &formula.dependencies {
            self.build(dep, true, fetched, visited, in_progress, plan)?;
        }

        in_progress.remove(name);
        visited.insert(name.to_string());

        let already_installed = is_dep && self.state.is_installed(name).unwrap_or(false);

        plan.push(ResolvedPackage {
            formula,
            is_dep,
            already_installed,
        });
        Ok(())
    }
}
