pub mod counter;

#[cfg(test)]
mod errors;
#[cfg(test)]
mod routing;
#[cfg(test)]
mod wire_peer;
