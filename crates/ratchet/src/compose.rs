//! Right-to-left function composition.

/// Composes single-argument functions from right to left.
///
/// `compose([f, g, h])` behaves like `|x| f(g(h(x)))`. With no functions the
/// result is the identity. This is how middleware layers and store
/// enhancers are stacked.
///
/// ```
/// use ratchet_core::compose;
///
/// let f = compose([
///     Box::new(|x: i32| x + 1) as Box<dyn Fn(i32) -> i32 + Send + Sync>,
///     Box::new(|x: i32| x * 10),
/// ]);
/// assert_eq!(f(2), 21);
/// ```
pub fn compose<T, F, I>(funcs: I) -> impl Fn(T) -> T + Send + Sync
where
    F: Fn(T) -> T + Send + Sync,
    I: IntoIterator<Item = F>,
{
    let funcs: Vec<F> = funcs.into_iter().collect();
    move |input| funcs.iter().rev().fold(input, |acc, f| f(acc))
}
