//! Almacén de artículos canónicos. Se construye una vez y es de sólo lectura.

use std::collections::BTreeMap;

use crate::error::RagError;
use crate::models::Article;

#[derive(Debug, Clone, Default)]
pub struct ArticleStore {
    articles: BTreeMap<u32, Article>,
}

impl ArticleStore {
    /// Construye el almacén validando ids únicos y positivos y contenido no vacío.
    pub fn from_articles(articles: Vec<Article>) -> Result<Self, RagError> {
        let mut map = BTreeMap::new();
        for article in articles {
            if article.id == 0 {
                return Err(RagError::InvalidCorpus(
                    "los ids de artículo deben ser positivos".to_string(),
                ));
            }
            if article.content.trim().is_empty() {
                return Err(RagError::InvalidCorpus(format!(
                    "el artículo {} no tiene contenido",
                    article.id
                )));
            }
            let id = article.id;
            if map.insert(id, article).is_some() {
                return Err(RagError::InvalidCorpus(format!(
                    "id de artículo duplicado: {id}"
                )));
            }
        }
        Ok(Self { articles: map })
    }

    pub fn get(&self, id: u32) -> Result<&Article, RagError> {
        self.articles.get(&id).ok_or(RagError::ArticleNotFound(id))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.articles.contains_key(&id)
    }

    /// Todos los artículos, en orden ascendente de id.
    pub fn all(&self) -> impl Iterator<Item = &Article> {
        self.articles.values()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }
}
