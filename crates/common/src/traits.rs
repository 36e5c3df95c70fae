//! Traits shared by generated design units.

/// Anything with a name it is declared under.
pub trait Identify {
    fn identifier(&self) -> String;
}

/// Anything that can carry a comment into the generated code.
pub trait Document {
    fn doc(&self) -> Option<&String>;
}

pub trait Documents: Document + Sized {
    fn set_doc(&mut self, doc: impl Into<String>);

    /// Builder form of [`Documents::set_doc`].
    fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.set_doc(doc);
        self
    }
}
