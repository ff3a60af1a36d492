//! Template expansion
//!
//! A configuration names templates, which may name further templates. The
//! resolver flattens that graph depth-first so every template lands before
//! the document that references it and the root configuration comes last.

use crate::document::{ConfigDocument, DocumentSource};
use crate::{Error, Result};

pub struct TemplateResolver<'a, S: DocumentSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: DocumentSource + ?Sized> TemplateResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Ordered document list for `root_id`, templates first, root last
    pub fn resolve(&self, root_id: &str) -> Result<Vec<ConfigDocument>> {
        let root = self.source.load(root_id)?;
        let mut ordered = Vec::new();
        let mut path = vec![root.id.clone()];

        self.expand(&root, &mut path, &mut ordered)?;
        ordered.push(root);

        tracing::debug!(
            config = %root_id,
            documents = ?ordered.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            "Resolved templates"
        );
        Ok(ordered)
    }

    /// `path` holds the chain of documents currently being expanded. A
    /// template reached again through a different parent is legitimate
    /// and is included again.
    fn expand(
        &self,
        document: &ConfigDocument,
        path: &mut Vec<String>,
        ordered: &mut Vec<ConfigDocument>,
    ) -> Result<()> {
        for template_id in &document.content.templates {
            if path.iter().any(|id| id == template_id) {
                let mut chain = path.clone();
                chain.push(template_id.clone());
                return Err(Error::CyclicTemplate { chain });
            }

            let template = self.source.load(template_id)?;
            path.push(template_id.clone());
            self.expand(&template, path, ordered)?;
            path.pop();
            ordered.push(template);
        }
        Ok(())
    }
}
