//! Movie command handlers.
//!
//! Every listing goes through an `AsyncResource`; fetch failures reach the
//! user through its error notifier.

use anyhow::{Context, Result, anyhow, bail};
use bingewatch_core::AsyncResource;
use bingewatch_core::catalog::{Movie, MovieCatalog, MovieList};
use bingewatch_core::config::Config;
use bingewatch_core::debounce::Debouncer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

fn alert(message: &str) {
    eprintln!("Error: {message}");
}

fn print_list(list: &MovieList, limit: usize) {
    if list.results.is_empty() {
        println!("No movies found");
        return;
    }
    for movie in list.results.iter().take(limit) {
        let year = movie.release_year().unwrap_or("----");
        println!(
            "{:>8}  {} ({year})  {:.1}/10",
            movie.id, movie.title, movie.vote_average
        );
    }
}

fn print_movie(catalog: &MovieCatalog, movie: &Movie) {
    match movie.release_year() {
        Some(year) => println!("{} ({year})", movie.title),
        None => println!("{}", movie.title),
    }
    println!("Rating: {:.1}/10", movie.vote_average);
    if let Some(poster) = catalog.poster_url(movie) {
        println!("Poster: {poster}");
    }
    if !movie.overview.is_empty() {
        println!();
        println!("{}", movie.overview);
    }
}

pub async fn popular(config: &Config, limit: usize) -> Result<()> {
    let catalog = MovieCatalog::from_config(config)?;
    let movies = AsyncResource::builder(move |()| {
        let catalog = catalog.clone();
        async move { catalog.fetch_popular_movies().await }
    })
    .on_error(alert)
    .start();

    let state = movies.settled().await;
    let list = state
        .value
        .ok_or_else(|| anyhow!("Could not load popular movies"))?;
    print_list(&list, limit);
    Ok(())
}

pub async fn search(config: &Config, query: String, limit: usize) -> Result<()> {
    let catalog = MovieCatalog::from_config(config)?;
    let movies = AsyncResource::builder(move |query: String| {
        let catalog = catalog.clone();
        async move { catalog.search_movies(&query).await }
    })
    .params(query)
    .on_error(alert)
    .start();

    let state = movies.settled().await;
    let list = state
        .value
        .ok_or_else(|| anyhow!("Could not search movies"))?;
    print_list(&list, limit);
    Ok(())
}

/// Search-as-you-type: each stdin line is a query, debounced before it is sent.
pub async fn search_stdin(config: &Config, limit: usize) -> Result<()> {
    let catalog = MovieCatalog::from_config(config)?;
    let movies = AsyncResource::builder(move |query: String| {
        let catalog = catalog.clone();
        async move { catalog.search_movies(&query).await }
    })
    .auto_start(false)
    .on_error(alert)
    .start();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let debouncer = Debouncer::new(config.search_debounce(), move |query: String| {
        tx.send(query).ok();
    });
    let input = tokio::spawn(read_queries(debouncer));

    while let Some(query) = rx.recv().await {
        debug!(%query, "searching");
        movies.reload(query.clone()).await;
        let state = movies.snapshot();
        if state.error.is_none()
            && let Some(list) = &state.value
        {
            println!("Results for \"{}\":", query.trim());
            print_list(list, limit);
        }
    }

    input.await.context("search input task")?
}

async fn read_queries(debouncer: Debouncer<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read search query")? {
        debouncer.call(line);
    }
    debouncer.flush();
    Ok(())
}

pub async fn show(config: &Config, id: u64) -> Result<()> {
    let catalog = MovieCatalog::from_config(config)?;
    let lookup = catalog.clone();
    let movie = AsyncResource::builder(move |id: u64| {
        let catalog = lookup.clone();
        async move { catalog.find_movie(id).await }
    })
    .params(id)
    .on_error(alert)
    .start();

    let state = movie.settled().await;
    let Some(found) = state.value else {
        bail!("Could not load movie {id}");
    };
    let Some(found) = found else {
        bail!("Movie {id} not found");
    };
    print_movie(&catalog, &found);
    Ok(())
}
