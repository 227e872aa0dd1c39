use std::fmt;

mod backtrace;
mod context;

use crate::BoxError;

/// Extends `Result` and `Option` with methods for adding context to errors.
pub trait ErrorContext: private::SealedErrorContext {
    /// The resulting type after adding context to the contained error.
    type Context;

    /// Convert into [`Self::Context`] as [`BoxError`], without extra context.
    fn into_box_error(self) -> Self::Context;

    /// Add context to the contained error.
    fn context<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Add context to the contained error, using [`fmt::Debug`] as [`fmt::Display`].
    fn context_debug<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + Send + Sync + 'static;

    /// Add keyed context to the contained error.
    fn context_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Same as [`Self::context_field`] but with a string-like value.
    fn context_str_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: Into<String>;

    /// Lazily add a context to the contained error, if it exists.
    fn with_context<C, F>(self, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;

    /// Lazily add keyed context to the contained error, if it exists.
    fn with_context_field<C, F>(self, key: &'static str, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Into<BoxError>> ErrorContext for Result<T, E> {
    type Context = Result<T, BoxError>;

    #[inline(always)]
    fn into_box_error(self) -> Self::Context {
        self.map_err(Into::into)
    }

    #[inline(always)]
    fn context<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| error.context(value))
    }

    #[inline(always)]
    fn context_debug<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + Send + Sync + 'static,
    {
        self.map_err(|error| error.context_debug(value))
    }

    #[inline(always)]
    fn context_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| error.context_field(key, value))
    }

    #[inline(always)]
    fn context_str_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: Into<String>,
    {
        self.map_err(|error| error.context_str_field(key, value))
    }

    #[inline(always)]
    fn with_context<C, F>(self, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.with_context(cb))
    }

    #[inline(always)]
    fn with_context_field<C, F>(self, key: &'static str, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.with_context_field(key, cb))
    }
}

impl<T> ErrorContext for Option<T> {
    type Context = Result<T, BoxError>;

    fn into_box_error(self) -> Self::Context {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())),
        }
    }

    fn context<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .context(value)),
        }
    }

    fn context_debug<M>(self, value: M) -> Self::Context
    where
        M: fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .context_debug(value)),
        }
    }

    fn context_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .context_field(key, value)),
        }
    }

    fn context_str_field<M>(self, key: &'static str, value: M) -> Self::Context
    where
        M: Into<String>,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .context_str_field(key, value)),
        }
    }

    fn with_context<C, F>(self, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .with_context(cb)),
        }
    }

    fn with_context_field<C, F>(self, key: &'static str, cb: F) -> Self::Context
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(BoxError::from("Option is None")
                .context_debug_field("type", std::any::type_name::<Self>())
                .with_context_field(key, cb)),
        }
    }
}

/// Extends any error convertible to [`BoxError`] with context-attaching methods.
pub trait ErrorExt: private::SealedErrorExt {
    /// Return self as [`BoxError`] without additional context.
    fn into_box_error(self) -> BoxError;

    /// Wrap the error in a context.
    fn context<M>(self, value: M) -> BoxError
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Wrap the error in a context, using [`fmt::Debug`] as [`fmt::Display`].
    fn context_debug<M>(self, value: M) -> BoxError
    where
        M: fmt::Debug + Send + Sync + 'static;

    /// Wrap the error in a keyed context.
    fn context_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Same as [`Self::context_field`] but with a string-like value.
    fn context_str_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: Into<String>;

    /// Wrap the error in a keyed context, using [`fmt::Debug`] as [`fmt::Display`].
    fn context_debug_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: fmt::Debug + Send + Sync + 'static;

    /// Lazily wrap the error with a context.
    fn with_context<C, F>(self, cb: F) -> BoxError
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;

    /// Lazily wrap the error with keyed context.
    fn with_context_field<C, F>(self, key: &'static str, cb: F) -> BoxError
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;

    /// Add a [`std::backtrace::Backtrace`] to the error, captured at this call site.
    fn backtrace(self) -> BoxError;
}

impl<Error: Into<BoxError>> ErrorExt for Error {
    #[inline(always)]
    fn into_box_error(self) -> BoxError {
        self.into()
    }

    fn context<M>(self, value: M) -> BoxError
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        let mut err = self.into();

        if let Some(existing) = err.downcast_mut::<self::context::ErrorWithContext>() {
            existing.insert_value(value);
            return err;
        }

        let mut wrapped = self::context::ErrorWithContext::new(err);
        wrapped.insert_value(value);
        Box::new(wrapped)
    }

    #[inline(always)]
    fn context_debug<M>(self, value: M) -> BoxError
    where
        M: fmt::Debug + Send + Sync + 'static,
    {
        self.context(self::context::DebugContextValue(value))
    }

    fn context_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        let mut err = self.into();

        if let Some(existing) = err.downcast_mut::<self::context::ErrorWithContext>() {
            existing.insert_key_value(key, value);
            return err;
        }

        let mut wrapped = self::context::ErrorWithContext::new(err);
        wrapped.insert_key_value(key, value);
        Box::new(wrapped)
    }

    fn context_str_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: Into<String>,
    {
        let mut err = self.into();

        if let Some(existing) = err.downcast_mut::<self::context::ErrorWithContext>() {
            existing.insert_key_value_str(key, value);
            return err;
        }

        let mut wrapped = self::context::ErrorWithContext::new(err);
        wrapped.insert_key_value_str(key, value);
        Box::new(wrapped)
    }

    #[inline(always)]
    fn context_debug_field<M>(self, key: &'static str, value: M) -> BoxError
    where
        M: fmt::Debug + Send + Sync + 'static,
    {
        self.context_field(key, self::context::DebugContextValue(value))
    }

    #[inline(always)]
    fn with_context<C, F>(self, cb: F) -> BoxError
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.context(cb())
    }

    #[inline(always)]
    fn with_context_field<C, F>(self, key: &'static str, cb: F) -> BoxError
    where
        C: fmt::Debug + fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.context_field(key, cb())
    }

    fn backtrace(self) -> BoxError {
        let source = self.into();
        Box::new(self::backtrace::ErrorWithBacktrace::new(source))
    }
}

mod private {
    pub trait SealedErrorContext {}

    impl<T, E> SealedErrorContext for Result<T, E> where E: Into<crate::BoxError> {}
    impl<T> SealedErrorContext for Option<T> {}

    pub trait SealedErrorExt {}

    impl<Error: Into<crate::BoxError>> SealedErrorExt for Error {}
}
