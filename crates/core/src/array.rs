//! Arrays: eager (materialized) and lazy (a re-enumerable stream source).
//!
//! Both kinds answer the same operations. A lazy array never materializes
//! as a side effect of `take`/`skip`/`sort`; those produce new lazy arrays.
//! Each enumeration of a lazy array calls its source again, and any element
//! may fail on its own.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{ErrorCode, SclError};
use crate::types::TypeReference;
use crate::value::SclObject;

pub type ElementStream = BoxStream<'static, Result<SclObject, SclError>>;

type Source = Arc<dyn Fn() -> ElementStream + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Array {
    Eager(EagerArray),
    Lazy(LazyArray),
}

// ──────────────────────────────────────────────
// EagerArray
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EagerArray {
    elements: Arc<Vec<SclObject>>,
}

impl EagerArray {
    pub fn new(elements: Vec<SclObject>) -> Self {
        EagerArray {
            elements: Arc::new(elements),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn as_slice(&self) -> &[SclObject] {
        &self.elements
    }

    pub fn into_vec(self) -> Vec<SclObject> {
        Arc::try_unwrap(self.elements).unwrap_or_else(|shared| (*shared).clone())
    }
}

// ──────────────────────────────────────────────
// LazyArray
// ──────────────────────────────────────────────

#[derive(Clone)]
pub struct LazyArray {
    source: Source,
    element_type: TypeReference,
}

impl LazyArray {
    pub fn new<F>(element_type: TypeReference, source: F) -> Self
    where
        F: Fn() -> ElementStream + Send + Sync + 'static,
    {
        LazyArray {
            source: Arc::new(source),
            element_type,
        }
    }

    /// Start a fresh enumeration.
    pub fn stream(&self) -> ElementStream {
        (self.source)()
    }

    pub fn element_type(&self) -> &TypeReference {
        &self.element_type
    }

    fn derive<F>(&self, element_type: TypeReference, f: F) -> LazyArray
    where
        F: Fn(ElementStream) -> ElementStream + Send + Sync + 'static,
    {
        let source = self.source.clone();
        LazyArray::new(element_type, move || f(source()))
    }
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyArray")
            .field("element_type", &self.element_type)
            .finish_non_exhaustive()
    }
}

// ──────────────────────────────────────────────
// Array
// ──────────────────────────────────────────────

impl Array {
    pub fn empty() -> Self {
        Array::Eager(EagerArray::default())
    }

    pub fn from_vec(elements: Vec<SclObject>) -> Self {
        Array::Eager(EagerArray::new(elements))
    }

    pub fn lazy<F>(element_type: TypeReference, source: F) -> Self
    where
        F: Fn() -> ElementStream + Send + Sync + 'static,
    {
        Array::Lazy(LazyArray::new(element_type, source))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Array::Lazy(_))
    }

    pub fn as_eager(&self) -> Option<&[SclObject]> {
        match self {
            Array::Eager(e) => Some(e.as_slice()),
            Array::Lazy(_) => None,
        }
    }

    pub fn element_type(&self) -> TypeReference {
        match self {
            Array::Eager(e) => {
                let types: Vec<TypeReference> =
                    e.as_slice().iter().map(SclObject::type_reference).collect();
                TypeReference::unify_all(&types)
            }
            Array::Lazy(l) => l.element_type.clone(),
        }
    }

    /// Enumerate the elements. Eager arrays never yield errors.
    pub fn stream(&self) -> ElementStream {
        match self {
            Array::Eager(e) => {
                let elements = e.elements.clone();
                let len = elements.len();
                stream::iter((0..len).map(move |i| Ok(elements[i].clone()))).boxed()
            }
            Array::Lazy(l) => l.stream(),
        }
    }

    /// Materialize, combining the errors of every failing element.
    pub async fn evaluate(&self) -> Result<EagerArray, SclError> {
        match self {
            Array::Eager(e) => Ok(e.clone()),
            Array::Lazy(l) => collect_all(l.stream()).await.map(EagerArray::new),
        }
    }

    pub async fn count(&self) -> Result<usize, SclError> {
        match self {
            Array::Eager(e) => Ok(e.len()),
            Array::Lazy(_) => self.evaluate().await.map(|e| e.len()),
        }
    }

    pub async fn any(&self) -> Result<bool, SclError> {
        match self {
            Array::Eager(e) => Ok(!e.is_empty()),
            Array::Lazy(l) => match l.stream().next().await {
                Some(Ok(_)) => Ok(true),
                Some(Err(e)) => Err(e),
                None => Ok(false),
            },
        }
    }

    pub fn take(&self, count: usize) -> Array {
        match self {
            Array::Eager(e) => {
                Array::from_vec(e.as_slice().iter().take(count).cloned().collect())
            }
            Array::Lazy(l) => {
                Array::Lazy(l.derive(l.element_type.clone(), move |s| s.take(count).boxed()))
            }
        }
    }

    pub fn skip(&self, count: usize) -> Array {
        match self {
            Array::Eager(e) => {
                Array::from_vec(e.as_slice().iter().skip(count).cloned().collect())
            }
            Array::Lazy(l) => {
                Array::Lazy(l.derive(l.element_type.clone(), move |s| s.skip(count).boxed()))
            }
        }
    }

    /// Stable sort by [`SclObject::compare`]. Lazy arrays stay lazy; the
    /// sort happens on each enumeration.
    pub fn sort(&self, descending: bool) -> Array {
        match self {
            Array::Eager(e) => {
                let mut elements = e.as_slice().to_vec();
                sort_elements(&mut elements, descending);
                Array::from_vec(elements)
            }
            Array::Lazy(l) => Array::Lazy(l.derive(l.element_type.clone(), move |s| {
                stream::once(collect_all(s))
                    .flat_map(move |result| -> ElementStream {
                        match result {
                            Ok(mut elements) => {
                                sort_elements(&mut elements, descending);
                                stream::iter(elements.into_iter().map(Ok)).boxed()
                            }
                            Err(e) => stream::iter(vec![Err(e)]).boxed(),
                        }
                    })
                    .boxed()
            })),
        }
    }

    /// Position of the first element equal to `element`.
    pub async fn index_of(&self, element: &SclObject) -> Result<Option<usize>, SclError> {
        match self {
            Array::Eager(e) => Ok(e.as_slice().iter().position(|x| x == element)),
            Array::Lazy(l) => {
                let mut s = l.stream();
                let mut i = 0;
                while let Some(item) = s.next().await {
                    if item? == *element {
                        return Ok(Some(i));
                    }
                    i += 1;
                }
                Ok(None)
            }
        }
    }

    pub async fn element_at(&self, index: usize) -> Result<SclObject, SclError> {
        match self {
            Array::Eager(e) => e
                .as_slice()
                .get(index)
                .cloned()
                .ok_or_else(|| ErrorCode::IndexOutOfBounds.unlocated()),
            Array::Lazy(l) => {
                let mut s = l.stream();
                let mut i = 0;
                while let Some(item) = s.next().await {
                    let item = item?;
                    if i == index {
                        return Ok(item);
                    }
                    i += 1;
                }
                Err(ErrorCode::IndexOutOfBounds.unlocated())
            }
        }
    }

    /// Run `action` on every element, then report every failure together.
    /// Stops early only when the run is cancelled.
    pub async fn for_each<F, Fut>(&self, mut action: F) -> Result<(), SclError>
    where
        F: FnMut(SclObject) -> Fut,
        Fut: Future<Output = Result<(), SclError>>,
    {
        let mut errors = Vec::new();
        let mut s = self.stream();
        while let Some(item) = s.next().await {
            let result = match item {
                Ok(element) => action(element).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                if e.is_cancelled() {
                    return Err(e);
                }
                errors.push(e);
            }
        }
        SclError::check(errors)
    }

    /// A view with every element as `element`, if all of them convert.
    /// Lazy arrays cannot know up front; their failures surface per element.
    pub fn maybe_as_elements(&self, element: &TypeReference) -> Option<Array> {
        if element.is_any_or_unknown() {
            return Some(self.clone());
        }
        match self {
            Array::Eager(e) => e
                .as_slice()
                .iter()
                .map(|x| x.maybe_as(element))
                .collect::<Option<Vec<_>>>()
                .map(Array::from_vec),
            Array::Lazy(_) => self.try_convert_elements(element, "Element").ok(),
        }
    }

    /// Convert every element to `element`. Eager arrays report every
    /// failing element together; lazy arrays fail per element when enumerated.
    pub fn try_convert_elements(
        &self,
        element: &TypeReference,
        property: &str,
    ) -> Result<Array, SclError> {
        match self {
            Array::Eager(e) => {
                let mut converted = Vec::with_capacity(e.len());
                let mut errors = Vec::new();
                for x in e.as_slice() {
                    match x.try_convert(element, property) {
                        Ok(v) => converted.push(v),
                        Err(code) => errors.push(code.unlocated()),
                    }
                }
                SclError::check(errors)?;
                Ok(Array::from_vec(converted))
            }
            Array::Lazy(l) => {
                let target = element.clone();
                let property = property.to_string();
                Ok(Array::Lazy(l.derive(element.clone(), move |s| {
                    let target = target.clone();
                    let property = property.clone();
                    s.map(move |item| {
                        item.and_then(|x| {
                            x.try_convert(&target, &property)
                                .map_err(ErrorCode::unlocated)
                        })
                    })
                    .boxed()
                })))
            }
        }
    }

    /// Map and filter every element. `f` returning `Ok(None)` drops the
    /// element. Eager arrays combine every failure; lazy arrays stay lazy.
    pub fn filter_map_elements<F>(&self, element_type: TypeReference, f: F) -> Result<Array, SclError>
    where
        F: Fn(SclObject) -> Result<Option<SclObject>, SclError> + Send + Sync + 'static,
    {
        match self {
            Array::Eager(e) => {
                let mut out = Vec::new();
                let mut errors = Vec::new();
                for x in e.as_slice() {
                    match f(x.clone()) {
                        Ok(Some(v)) => out.push(v),
                        Ok(None) => {}
                        Err(err) => errors.push(err),
                    }
                }
                SclError::check(errors)?;
                Ok(Array::from_vec(out))
            }
            Array::Lazy(l) => {
                let f = Arc::new(f);
                Ok(Array::Lazy(l.derive(element_type, move |s| {
                    let f = f.clone();
                    s.filter_map(move |item| {
                        let mapped = match item.and_then(|x| f(x)) {
                            Ok(Some(v)) => Some(Ok(v)),
                            Ok(None) => None,
                            Err(e) => Some(Err(e)),
                        };
                        futures::future::ready(mapped)
                    })
                    .boxed()
                })))
            }
        }
    }

    /// Concatenate. The result is lazy if any input is lazy.
    pub fn concat(arrays: Vec<Array>) -> Array {
        if arrays.iter().all(|a| !a.is_lazy()) {
            let elements = arrays
                .iter()
                .filter_map(Array::as_eager)
                .flat_map(|e| e.iter().cloned())
                .collect();
            return Array::from_vec(elements);
        }
        let types: Vec<TypeReference> = arrays.iter().map(Array::element_type).collect();
        let element_type = TypeReference::unify_all(&types);
        let arrays = Arc::new(arrays);
        Array::lazy(element_type, move || {
            let parts: Vec<ElementStream> = arrays.iter().map(Array::stream).collect();
            stream::iter(parts).flatten().boxed()
        })
    }

    /// SCL literal text. A lazy array only describes itself; evaluate it
    /// first to get its elements.
    pub fn serialize(&self) -> String {
        match self {
            Array::Eager(e) => {
                let items: Vec<String> = e.as_slice().iter().map(SclObject::serialize).collect();
                format!("[{}]", items.join(", "))
            }
            Array::Lazy(l) => format!("LazyArray<{}>", l.element_type),
        }
    }

    pub fn format(&self) -> String {
        match self {
            Array::Eager(e) => {
                let items: Vec<String> = e.as_slice().iter().map(SclObject::format).collect();
                format!("[{}]", items.join(", "))
            }
            Array::Lazy(_) => self.serialize(),
        }
    }
}

impl PartialEq for Array {
    /// Only materialized arrays compare equal; evaluate lazy arrays first.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Array::Eager(a), Array::Eager(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Vec<SclObject>> for Array {
    fn from(elements: Vec<SclObject>) -> Self {
        Array::from_vec(elements)
    }
}

fn sort_elements(elements: &mut [SclObject], descending: bool) {
    if descending {
        elements.sort_by(|a, b| b.compare(a));
    } else {
        elements.sort_by(|a, b| a.compare(b));
    }
}

async fn collect_all(mut s: ElementStream) -> Result<Vec<SclObject>, SclError> {
    let mut elements = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = s.next().await {
        match item {
            Ok(x) => elements.push(x),
            Err(e) => errors.push(e),
        }
    }
    SclError::check(errors)?;
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ints(values: &[i64]) -> Array {
        Array::from_vec(values.iter().map(|i| SclObject::Int(*i)).collect())
    }

    fn counting_range(to: i64, calls: Arc<AtomicUsize>) -> Array {
        Array::lazy(TypeReference::INTEGER, move || {
            let calls = calls.clone();
            stream::iter(1..=to)
                .map(move |i| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(SclObject::Int(i))
                })
                .boxed()
        })
    }

    fn failing_at(bad: &'static [i64]) -> Array {
        Array::lazy(TypeReference::INTEGER, move || {
            stream::iter(1..=5)
                .map(move |i| {
                    if bad.contains(&i) {
                        Err(ErrorCode::Unknown(format!("bad {}", i)).unlocated())
                    } else {
                        Ok(SclObject::Int(i))
                    }
                })
                .boxed()
        })
    }

    #[tokio::test]
    async fn take_on_lazy_stays_lazy_and_enumerates_prefix() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = counting_range(1000, calls.clone());
        let first = lazy.take(3);
        assert!(first.is_lazy());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let evaluated = first.evaluate().await.unwrap();
        assert_eq!(evaluated.as_slice(), ints(&[1, 2, 3]).as_eager().unwrap());
        assert!(calls.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn take_on_eager_is_eager() {
        let taken = ints(&[1, 2, 3, 4]).take(2);
        assert!(!taken.is_lazy());
        assert_eq!(taken, ints(&[1, 2]));
    }

    #[tokio::test]
    async fn lazy_sort_stays_lazy() {
        let lazy = Array::lazy(TypeReference::INTEGER, || {
            stream::iter([3, 1, 2].map(|i| Ok(SclObject::Int(i)))).boxed()
        });
        let sorted = lazy.sort(false);
        assert!(sorted.is_lazy());
        assert_eq!(
            Array::Eager(sorted.evaluate().await.unwrap()),
            ints(&[1, 2, 3])
        );
        assert_eq!(ints(&[3, 1, 2]).sort(true), ints(&[3, 2, 1]));
    }

    #[tokio::test]
    async fn evaluate_combines_every_element_error() {
        let err = failing_at(&[2, 4]).evaluate().await.unwrap_err();
        assert_eq!(err.errors().len(), 2);
    }

    #[tokio::test]
    async fn for_each_visits_everything_and_collects_errors() {
        let mut seen = Vec::new();
        let result = ints(&[1, 2, 3])
            .for_each(|x| {
                seen.push(x.clone());
                async move {
                    if x == SclObject::Int(2) {
                        Err(ErrorCode::DivideByZero.unlocated())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert_eq!(seen.len(), 3);
        assert_eq!(result.unwrap_err().errors().len(), 1);
    }

    #[tokio::test]
    async fn element_access() {
        let lazy = counting_range(10, Arc::new(AtomicUsize::new(0)));
        assert_eq!(lazy.element_at(4).await.unwrap(), SclObject::Int(5));
        assert!(lazy.element_at(10).await.is_err());
        assert_eq!(lazy.index_of(&SclObject::Int(3)).await.unwrap(), Some(2));
        assert_eq!(lazy.count().await.unwrap(), 10);
        assert!(lazy.any().await.unwrap());
        assert!(!Array::empty().any().await.unwrap());
    }

    #[tokio::test]
    async fn convert_elements_combines_failures_on_eager() {
        let mixed = Array::from_vec(vec![
            SclObject::Int(1),
            SclObject::from("a"),
            SclObject::from("b"),
        ]);
        let err = mixed
            .try_convert_elements(&TypeReference::INTEGER, "Array")
            .unwrap_err();
        assert_eq!(err.errors().len(), 2);
        let doubles = ints(&[1, 2])
            .try_convert_elements(&TypeReference::DOUBLE, "Array")
            .unwrap();
        assert_eq!(
            doubles,
            Array::from_vec(vec![SclObject::Double(1.0), SclObject::Double(2.0)])
        );
    }

    #[tokio::test]
    async fn concat_with_lazy_input_is_lazy() {
        let lazy = counting_range(2, Arc::new(AtomicUsize::new(0)));
        let joined = Array::concat(vec![ints(&[0]), lazy]);
        assert!(joined.is_lazy());
        assert_eq!(Array::Eager(joined.evaluate().await.unwrap()), ints(&[0, 1, 2]));
        assert_eq!(Array::concat(vec![ints(&[1]), ints(&[2])]), ints(&[1, 2]));
    }

    #[test]
    fn serialize_eager() {
        assert_eq!(ints(&[1, 2]).serialize(), "[1, 2]");
        assert_eq!(Array::empty().serialize(), "[]");
    }
}
