use quote::ToTokens;

type ParseResult<T> = Result<T, syn::Error>;

pub fn error_fn<T>(msg: impl AsRef<str>, tokens: T) -> syn::Error
where
    T: ToTokens,
{
    syn::Error::new_spanned(tokens, msg.as_ref())
}

pub fn bail_fn<R, T>(msg: impl AsRef<str>, tokens: T) -> ParseResult<R>
where
    T: ToTokens,
{
    Err(error_fn(msg, tokens))
}

macro_rules! bail {
    ($tokens:expr, $format_string:literal $($rest:tt)*) => {
        $crate::util::bail_fn(format!($format_string $($rest)*), $tokens)
    }
}

pub(crate) use bail;
