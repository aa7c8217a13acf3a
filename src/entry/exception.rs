use std::error::Error as StdError;

/// Structured, serializable snapshot of an error and its causes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionData {
    pub message: String,
    pub type_name: String,
    pub qualified_type_name: String,
    pub stack_trace: Option<String>,
    pub file_name: Option<String>,
    pub detail_info: Option<String>,
    pub inner: Option<Box<ExceptionData>>,
    pub aggregated: Vec<ExceptionData>,
}

impl ExceptionData {
    pub fn new(
        message: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        let type_name = type_name.into();
        Self {
            message: message.into(),
            qualified_type_name: type_name.clone(),
            type_name,
            ..Default::default()
        }
    }

    /// Captures `err` and its `source()` chain as nested inner exceptions.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        let qualified = std::any::type_name::<E>();
        let short = qualified.rsplit("::").next().unwrap_or(qualified);
        let mut data = ExceptionData {
            message: err.to_string(),
            type_name: short.to_string(),
            qualified_type_name: qualified.to_string(),
            ..Default::default()
        };
        data.inner = err.source().map(|source| Box::new(Self::from_source(source)));
        data
    }

    fn from_source(err: &(dyn StdError + 'static)) -> Self {
        ExceptionData {
            message: err.to_string(),
            type_name: "source".to_string(),
            qualified_type_name: "source".to_string(),
            inner: err.source().map(|s| Box::new(Self::from_source(s))),
            ..Default::default()
        }
    }

    pub fn with_stack_trace(
        mut self,
        stack_trace: impl Into<String>,
    ) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_inner(
        mut self,
        inner: ExceptionData,
    ) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Depth-first iteration over this exception and all nested ones.
    pub fn walk(&self) -> Vec<&ExceptionData> {
        let mut out = vec![self];
        if let Some(inner) = &self.inner {
            out.extend(inner.walk());
        }
        for a in &self.aggregated {
            out.extend(a.walk());
        }
        out
    }
}
