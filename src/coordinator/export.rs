//! CSV persistence for collected records, written on coordinator shutdown.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::types::{BookRecord, Item, ItemType};

/// Write `books.csv`: header `Title,Price,Rating,URL`, every value quoted.
pub fn write_books_csv(path: &Path, books: &[BookRecord]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "Title,Price,Rating,URL")?;
    for book in books {
        writeln!(
            out,
            "{},{},{},{}",
            quote(&book.title),
            quote(&book.price),
            quote(&book.rating),
            quote(&book.url)
        )?;
    }

    out.flush()?;
    info!(count = books.len(), path = %path.display(), "saved books");
    Ok(())
}

/// Write `items.csv` with the common columns plus type-specific columns
/// appended only when the corresponding item types are present.
pub fn write_items_csv(path: &Path, items: &[Item]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    let has_jobs = items.iter().any(|i| i.item_type == ItemType::Job);
    let has_products = items.iter().any(|i| i.item_type == ItemType::Product);
    let has_articles = items.iter().any(|i| i.item_type == ItemType::Article);

    write!(out, "Type,Title,Price,Rating,Category,URL,Description")?;
    if has_jobs {
        write!(out, ",Company,Location,Salary")?;
    }
    if has_products {
        write!(out, ",ImageUrl")?;
    }
    if has_articles {
        write!(out, ",PublishDate,Author")?;
    }
    writeln!(out)?;

    for item in items {
        write!(
            out,
            "{},{},{},{},{},{},{}",
            quote(item.item_type.label()),
            quote(&item.title),
            quote(&item.price.to_string()),
            quote(&item.rating.to_string()),
            quote(&item.category),
            quote(&item.url),
            quote(&item.description)
        )?;
        if has_jobs {
            write!(
                out,
                ",{},{},{}",
                quote(item.fields.get("company").map_or("", String::as_str)),
                quote(item.fields.get("location").map_or("", String::as_str)),
                quote(item.fields.get("salary").map_or("", String::as_str))
            )?;
        }
        if has_products {
            write!(out, ",{}", quote(&item.image_url))?;
        }
        if has_articles {
            write!(
                out,
                ",{},{}",
                quote(&item.date),
                quote(item.fields.get("author").map_or("", String::as_str))
            )?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    info!(count = items.len(), path = %path.display(), "saved items");
    Ok(())
}

/// Double-quote-wrap a value, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
