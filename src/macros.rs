pub use enclose::*;

/// Builds a computed [`Store`](crate::Store), cloning the listed captures
/// into the closure.
///
/// ```ignore
/// let total = computed!((a, b) cx => cx.use_store(&a) + cx.use_store(&b));
/// ```
#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
        $crate::Store::computed($crate::macros::enclose!(($( $d_tt )*) move |$ctx: &$crate::Evaluation| { $($b)* }))
    };
    ($ctx:ident => $($b:tt)*) => {
        $crate::Store::computed(move |$ctx: &$crate::Evaluation| { $($b)* })
    };
}

/// Builds a [`Cache`](crate::Cache) with default options, cloning the listed
/// captures into the cache function.
///
/// ```ignore
/// let user = cache!((api) cx => async move { api.fetch_user().await });
/// ```
#[macro_export]
macro_rules! cache {
    (( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
        $crate::Cache::new(
            $crate::macros::enclose!(($( $d_tt )*) move |$ctx| { $($b)* }),
            $crate::CacheOptions::default(),
        )
    };
    ($ctx:ident => $($b:tt)*) => {
        $crate::Cache::new(move |$ctx| { $($b)* }, $crate::CacheOptions::default())
    };
}
