//! Projectors over cached collections, matching elements by identity

use crate::domain::Record;

/// Whole-value replacement
pub fn replace<V: Clone + Send + Sync + 'static>(value: V) -> impl Fn(Option<&V>) -> V + Send + Sync + 'static {
    move |_| value.clone()
}

/// Append `item` to the list
pub fn append<T: Record>(item: T) -> impl Fn(Option<&Vec<T>>) -> Vec<T> + Send + Sync + 'static {
    move |list| {
        let mut next = list.cloned().unwrap_or_default();
        next.push(item.clone());
        next
    }
}

/// Drop the element with `id`
pub fn remove<T: Record>(id: T::Id) -> impl Fn(Option<&Vec<T>>) -> Vec<T> + Send + Sync + 'static {
    move |list| {
        list.map(|items| items.iter().filter(|item| *item.id() != id).cloned().collect())
            .unwrap_or_default()
    }
}

/// Rewrite the element with `id`; other elements are left alone
pub fn update<T, F>(id: T::Id, f: F) -> impl Fn(Option<&Vec<T>>) -> Vec<T> + Send + Sync + 'static
where
    T: Record,
    F: Fn(&T) -> T + Send + Sync + 'static,
{
    move |list| {
        list.map(|items| {
            items
                .iter()
                .map(|item| if *item.id() == id { f(item) } else { item.clone() })
                .collect()
        })
        .unwrap_or_default()
    }
}

/// Replace the element with the same id as `item`, or append it
pub fn upsert<T: Record>(list: Option<Vec<T>>, item: T) -> Vec<T> {
    let mut items = list.unwrap_or_default();
    match items.iter().position(|existing| existing.id() == item.id()) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
    items
}

/// Drop the element with `id` from an owned list
pub fn without<T: Record>(list: Option<Vec<T>>, id: &T::Id) -> Vec<T> {
    list.unwrap_or_default()
        .into_iter()
        .filter(|item| item.id() != id)
        .collect()
}

/// Put `item` in place of the first element matching `correlate`, or append it
pub fn swap_matching<T, C>(list: Option<Vec<T>>, item: T, correlate: C) -> Vec<T>
where
    T: Record,
    C: Fn(&T, &T) -> bool,
{
    let mut items = list.unwrap_or_default();
    match items
        .iter()
        .position(|existing| existing.id() == item.id() || correlate(existing, &item))
    {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
    items
}
